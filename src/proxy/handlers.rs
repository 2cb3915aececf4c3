//! HTTP request handlers.
//!
//! Every handler authenticates the caller before touching the body or any
//! upstream, so a rejected credential never costs an exchange call.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Response},
};

use super::images;
use super::server::AppState;
use super::transform;
use crate::auth;
use crate::error::Error;
use crate::headers::{self, ApiKind};

pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
pub const EMBEDDINGS_PATH: &str = "embeddings";
pub const MODELS_PATH: &str = "models";

/// Handle POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let caller = auth::caller_credential(&headers)?;
    let mut body = transform::parse_body(&body)?;
    let upstream_credential = state.broker.resolve(&caller).await?;

    let inlined = images::inline_images(&state.http_client, &mut body).await;
    if inlined > 0 {
        tracing::debug!(images = inlined, "Inlined remote images");
    }

    let request = state.transformer.build_value(body, &upstream_credential)?;

    tracing::info!(
        caller = %caller.fingerprint(),
        model = %request.model,
        stream = request.is_streaming,
        vision = request.contains_image,
        "Received chat completion request"
    );

    let url = state.config.upstream.endpoint(CHAT_COMPLETIONS_PATH);
    state.relay.run(&url, request).await
}

/// Handle POST /v1/embeddings
pub async fn embeddings(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let caller = auth::caller_credential(&headers)?;
    let body = transform::parse_body(&body)?;
    let upstream_credential = state.broker.resolve(&caller).await?;

    tracing::info!(
        caller = %caller.fingerprint(),
        model = ?body.get("model").and_then(|m| m.as_str()),
        "Received embeddings request"
    );

    let upstream_headers = headers::api_headers(
        state.transformer.fingerprint(),
        &upstream_credential,
        ApiKind::Embeddings,
    )?;
    let url = state.config.upstream.endpoint(EMBEDDINGS_PATH);
    state
        .forwarder
        .run(Method::POST, &url, upstream_headers, Some(&body))
        .await
}

/// Handle GET /v1/models
pub async fn list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let caller = auth::caller_credential(&headers)?;
    let upstream_credential = state.broker.resolve(&caller).await?;

    tracing::debug!(caller = %caller.fingerprint(), "Listing models");

    let upstream_headers = headers::api_headers(
        state.transformer.fingerprint(),
        &upstream_credential,
        ApiKind::Models,
    )?;
    let url = state.config.upstream.endpoint(MODELS_PATH);
    state
        .forwarder
        .run(Method::GET, &url, upstream_headers, None)
        .await
}

/// Handle GET /v1/chat/completions, a landing page for browsers.
pub async fn welcome() -> Html<&'static str> {
    Html(
        "<html><head><title>Welcome to API</title></head>\
         <body><h1>Welcome to API</h1>\
         <p>This API relays OpenAI-style chat, embeddings and model requests to GitHub Copilot.</p>\
         </body></html>",
    )
}

/// Handle OPTIONS on every endpoint
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
        ],
    )
}
