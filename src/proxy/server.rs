//! HTTP server setup and configuration.

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use super::forward::NormalResponseForwarder;
use super::handlers;
use super::stream::StreamRelay;
use super::transform::RequestTransformer;
use crate::broker::{CredentialBroker, TokenExchange};
use crate::config::Config;
use crate::error::Error;
use crate::storage::{self, CredentialStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<CredentialBroker>,
    pub transformer: Arc<RequestTransformer>,
    pub relay: StreamRelay,
    pub forwarder: NormalResponseForwarder,
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every component from `config`, opening the credential database.
    pub async fn build(config: Config) -> Result<Self, Error> {
        let http_client = config.upstream.build_client()?;
        let pool = storage::init_pool(&config.database.path).await?;
        tracing::info!(path = %config.database.path, "Credential store ready");

        let fingerprint = Arc::new(config.fingerprint.clone());
        let exchange =
            TokenExchange::new(http_client.clone(), &config.upstream, fingerprint.clone());
        let broker = CredentialBroker::new(CredentialStore::new(pool), exchange);

        Ok(Self {
            broker: Arc::new(broker),
            transformer: Arc::new(RequestTransformer::new(fingerprint)),
            relay: StreamRelay::new(http_client.clone(), config.upstream.stream_poll_interval()),
            forwarder: NormalResponseForwarder::new(http_client.clone()),
            http_client,
            config: Arc::new(config),
        })
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints
        .route(
            "/v1/chat/completions",
            post(handlers::chat_completions)
                .get(handlers::welcome)
                .options(handlers::preflight),
        )
        .route(
            "/v1/embeddings",
            post(handlers::embeddings).options(handlers::preflight),
        )
        .route(
            "/v1/models",
            get(handlers::list_models)
                .post(handlers::list_models)
                .options(handlers::preflight),
        )
        // State and middleware
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Bind `listen`, moving to the next port on conflict when `auto_increment` is set.
///
/// At most `max_attempts` ports are tried.
pub async fn bind_listener(
    listen: &str,
    auto_increment: bool,
    max_attempts: u16,
) -> anyhow::Result<TcpListener> {
    let (host, port) = listen
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("listen address '{}' has no port", listen))?;
    let mut port: u16 = port
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid port in '{}': {}", listen, e))?;
    let attempts = if auto_increment { max_attempts.max(1) } else { 1 };

    let mut attempt = 1;
    loop {
        let addr = format!("{}:{}", host, port);
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempt < attempts => {
                tracing::warn!(address = %addr, "Port in use, trying next port");
                port = port
                    .checked_add(1)
                    .ok_or_else(|| anyhow::anyhow!("ran out of ports after {}", addr))?;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::anyhow!("failed to bind {}: {}", addr, e));
            }
        }
    }
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listener = bind_listener(
        &config.server.listen,
        config.server.auto_increment_port,
        config.server.max_port_attempts,
    )
    .await?;

    let state = AppState::build(config).await?;
    let app = create_router(state);

    let address = listener.local_addr()?;
    tracing::info!(address = %address, "Starting copilot-gateway server");

    axum::serve(listener, app).await?;

    Ok(())
}
