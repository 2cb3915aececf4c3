//! Upstream header sets built from the vendor [`Fingerprint`].

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::Fingerprint;
use crate::error::Error;

/// Header carrying whether a chat request contains image content.
pub const VISION_HEADER: &str = "copilot-vision-request";
/// Header naming the purpose of an upstream API call.
pub const INTENT_HEADER: &str = "openai-intent";

/// Which upstream API a header set is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    ChatCompletions,
    Embeddings,
    Models,
}

impl ApiKind {
    pub fn intent(&self) -> &'static str {
        match self {
            ApiKind::ChatCompletions => "conversation-panel",
            ApiKind::Embeddings => "embeddings",
            ApiKind::Models => "model-access",
        }
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), Error> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| Error::Internal(format!("Invalid value for header '{}'", name)))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

fn insert_fetch_metadata(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("no-cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
}

/// 64 lowercase hex characters, fresh per call.
fn machine_id() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Headers for an upstream API call authorized by an upstream credential.
///
/// The image-content flag is added separately by the chat transformer.
pub fn api_headers(
    fingerprint: &Fingerprint,
    upstream_credential: &str,
    kind: ApiKind,
) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    insert(&mut headers, "editor-plugin-version", &fingerprint.editor_plugin_version)?;
    insert(&mut headers, "editor-version", &fingerprint.editor_version)?;
    insert(&mut headers, "openai-organization", &fingerprint.openai_organization)?;
    insert(&mut headers, "user-agent", &fingerprint.user_agent)?;
    insert(&mut headers, "x-github-api-version", &fingerprint.github_api_version)?;
    insert(&mut headers, "vscode-machineid", &machine_id())?;
    insert(
        &mut headers,
        "vscode-sessionid",
        &uuid::Uuid::new_v4().to_string(),
    )?;
    insert(&mut headers, "x-request-id", &uuid::Uuid::new_v4().to_string())?;
    insert_fetch_metadata(&mut headers);
    headers.insert(
        HeaderName::from_static(INTENT_HEADER),
        HeaderValue::from_static(kind.intent()),
    );
    insert(
        &mut headers,
        "authorization",
        &format!("Bearer {}", upstream_credential),
    )?;
    Ok(headers)
}

/// Headers for the credential exchange call, authorized by the caller credential.
pub fn exchange_headers(
    fingerprint: &Fingerprint,
    caller_credential: &str,
) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    insert(&mut headers, "editor-plugin-version", &fingerprint.editor_plugin_version)?;
    insert(&mut headers, "editor-version", &fingerprint.editor_version)?;
    insert(&mut headers, "user-agent", &fingerprint.user_agent)?;
    insert(&mut headers, "x-github-api-version", &fingerprint.github_api_version)?;
    insert_fetch_metadata(&mut headers);
    insert(
        &mut headers,
        "authorization",
        &format!("token {}", caller_credential),
    )?;
    Ok(headers)
}

/// Headers for the identity lookup, authorized by the caller credential.
pub fn identity_headers(
    fingerprint: &Fingerprint,
    caller_credential: &str,
) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    insert(&mut headers, "editor-version", &fingerprint.editor_version)?;
    insert(&mut headers, "user-agent", &fingerprint.user_agent)?;
    headers.insert(
        HeaderName::from_static("x-github-api-version"),
        HeaderValue::from_static("2022-11-28"),
    );
    insert_fetch_metadata(&mut headers);
    insert(
        &mut headers,
        "authorization",
        &format!("token {}", caller_credential),
    )?;
    Ok(headers)
}
