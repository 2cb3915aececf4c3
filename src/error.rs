//! Error types for copilot-gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for copilot-gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Missing, malformed or wrong-prefix caller credential.
    #[error("{0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The credential exchange was unreachable or returned no credential.
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Upstream request failed: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status.
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamStatus { status, .. } => *status,
            Error::Config(_)
            | Error::ExchangeFailed(_)
            | Error::StoreUnavailable(_)
            | Error::UpstreamTransport(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "Request rejected");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_auth_error_is_401_with_flat_body() {
        let response = Error::Auth("Invalid token prefix.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"error": "Invalid token prefix."}));
    }

    #[tokio::test]
    async fn test_upstream_status_passes_through() {
        let response = Error::UpstreamStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "slow down".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Upstream returned 429 Too Many Requests: slow down");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::ExchangeFailed("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Auth("Token is empty.".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_local_failures_are_500() {
        let store = Error::from(sqlx::Error::RowNotFound);
        assert!(matches!(store, Error::StoreUnavailable(_)));
        assert_eq!(store.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        // An unparsable URL fails when the request is built, without any I/O.
        let transport_err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let transport = Error::from(transport_err);
        assert!(matches!(transport, Error::UpstreamTransport(_)));
        assert_eq!(transport.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let config = Error::from(crate::config::ConfigError::Validation("bad".into()));
        assert!(matches!(config, Error::Config(_)));
        assert_eq!(config.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_store_failure_renders_uniform_body() {
        let response = Error::from(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Credential store unavailable"));
    }
}
