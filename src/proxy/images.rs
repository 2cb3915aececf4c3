//! Inline remote image URLs in chat messages as `data:` URIs.
//!
//! The upstream only accepts embedded image data, so any `image_url` entry
//! pointing at a remote resource is downloaded and base64-encoded. A failed
//! download leaves the entry untouched.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

/// MIME type used when the image response does not declare one.
const FALLBACK_MIME: &str = "image/png";

/// Build a `data:` URI from raw image bytes.
pub fn data_uri(content_type: Option<&str>, bytes: &[u8]) -> String {
    let mime = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or(FALLBACK_MIME);
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

async fn download(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?;
    Ok(data_uri(content_type.as_deref(), &bytes))
}

/// Replace remote image URLs in `body.messages[*].content[*]` with data URIs.
///
/// Returns the number of images inlined.
pub async fn inline_images(client: &reqwest::Client, body: &mut Value) -> usize {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut inlined = 0;
    for message in messages.iter_mut() {
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        for item in content.iter_mut() {
            if item.get("type").and_then(Value::as_str) != Some("image_url") {
                continue;
            }
            let Some(url_slot) = item.get_mut("image_url").and_then(|v| v.get_mut("url")) else {
                continue;
            };
            let Some(url) = url_slot.as_str().map(str::to_string) else {
                continue;
            };
            if url.starts_with("data:") {
                continue;
            }

            match download(client, &url).await {
                Ok(uri) => {
                    *url_slot = Value::String(uri);
                    inlined += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        "Failed to download image, leaving URL as-is"
                    );
                }
            }
        }
    }
    inlined
}
