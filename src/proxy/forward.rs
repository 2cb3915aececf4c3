//! Whole-response forwarding for non-streaming upstream calls.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method},
    response::Response,
};
use serde_json::Value;

use crate::error::Error;

/// Performs one upstream call and returns its body as a JSON response.
#[derive(Clone)]
pub struct NormalResponseForwarder {
    client: reqwest::Client,
}

impl NormalResponseForwarder {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send the request and buffer the full upstream body.
    ///
    /// A 2xx answer is returned with the upstream status unchanged. A non-2xx
    /// answer becomes [`Error::UpstreamStatus`] so the caller sees the
    /// upstream status with the uniform error body; a transport failure
    /// becomes [`Error::UpstreamTransport`] (500).
    pub async fn run(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> Result<Response, Error> {
        let mut request = self.client.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let upstream = request.send().await.map_err(|e| {
            tracing::error!(method = %method, url = %url, error = %e, "Upstream request failed");
            Error::UpstreamTransport(e)
        })?;

        let status = upstream.status();
        let bytes = upstream.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            tracing::warn!(status = %status, url = %url, "Upstream returned non-success status");
            return Err(Error::UpstreamStatus { status, body });
        }

        tracing::debug!(status = %status, bytes = bytes.len(), "Forwarding upstream response");

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}", addr)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_passes_status_and_body() {
        let app = Router::new().route(
            "/echo",
            post(|Json(body): Json<Value>| async move {
                (StatusCode::CREATED, Json(json!({"echo": body})))
            }),
        );
        let base = serve(app).await;

        let forwarder = NormalResponseForwarder::new(reqwest::Client::new());
        let response = forwarder
            .run(
                Method::POST,
                &format!("{}/echo", base),
                HeaderMap::new(),
                Some(&json!({"x": 1})),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_json(response).await, json!({"echo": {"x": 1}}));
    }

    #[tokio::test]
    async fn test_non_success_becomes_upstream_status() {
        let app = Router::new().route(
            "/limited",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
        );
        let base = serve(app).await;

        let forwarder = NormalResponseForwarder::new(reqwest::Client::new());
        let err = forwarder
            .run(
                Method::POST,
                &format!("{}/limited", base),
                HeaderMap::new(),
                None,
            )
            .await
            .unwrap_err();

        match err {
            Error::UpstreamStatus { status, body } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transport_error() {
        let forwarder = NormalResponseForwarder::new(reqwest::Client::new());
        let err = forwarder
            .run(Method::GET, "http://127.0.0.1:9/models", HeaderMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamTransport(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
