//! Rewrites an inbound chat request into the upstream wire shape.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::Fingerprint;
use crate::error::Error;
use crate::headers::{self, ApiKind, VISION_HEADER};

/// Model used when a chat request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Upstream-shaped chat request plus the flags derived while building it.
#[derive(Debug, Clone)]
pub struct TransformedRequest {
    pub body: Value,
    pub model: String,
    /// Whether the response is relayed as a live event stream.
    pub is_streaming: bool,
    pub contains_image: bool,
    pub headers: HeaderMap,
}

/// Parse a request body that must be a JSON object.
pub fn parse_body(raw: &[u8]) -> Result<Value, Error> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| Error::BadRequest(format!("Invalid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(Error::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Whether any message content entry is an image.
pub fn contains_image_content(body: &Value) -> bool {
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return false;
    };
    messages
        .iter()
        .filter_map(|message| message.get("content").and_then(Value::as_array))
        .flatten()
        .any(|item| item.get("type").and_then(Value::as_str) == Some("image_url"))
}

/// Builds [`TransformedRequest`]s using the vendor fingerprint.
#[derive(Clone)]
pub struct RequestTransformer {
    fingerprint: Arc<Fingerprint>,
}

impl RequestTransformer {
    pub fn new(fingerprint: Arc<Fingerprint>) -> Self {
        Self { fingerprint }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Parse `raw_body` and build the upstream request.
    pub fn build(
        &self,
        raw_body: &[u8],
        upstream_credential: &str,
    ) -> Result<TransformedRequest, Error> {
        self.build_value(parse_body(raw_body)?, upstream_credential)
    }

    /// Build the upstream request from an already-parsed body.
    pub fn build_value(
        &self,
        mut body: Value,
        upstream_credential: &str,
    ) -> Result<TransformedRequest, Error> {
        let obj = body.as_object_mut().ok_or_else(|| {
            Error::BadRequest("Request body must be a JSON object".to_string())
        })?;

        let model = match obj.get("model").and_then(Value::as_str) {
            Some(model) => model.to_string(),
            None => {
                obj.insert("model".to_string(), Value::from(DEFAULT_MODEL));
                DEFAULT_MODEL.to_string()
            }
        };

        let requested_stream = obj.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let is_streaming = if self.fingerprint.is_reasoning_model(&model) {
            if requested_stream {
                tracing::debug!(model = %model, "Disabling stream for reasoning model");
            }
            false
        } else {
            requested_stream
        };
        obj.insert("stream".to_string(), Value::Bool(is_streaming));

        let contains_image = contains_image_content(&body);

        let mut headers =
            headers::api_headers(&self.fingerprint, upstream_credential, ApiKind::ChatCompletions)?;
        headers.insert(
            HeaderName::from_static(VISION_HEADER),
            HeaderValue::from_static(if contains_image { "true" } else { "false" }),
        );

        Ok(TransformedRequest {
            body,
            model,
            is_streaming,
            contains_image,
            headers,
        })
    }
}
