//! Shared fixtures for integration tests.
//!
//! [`MockUpstream`] is a single axum server on a random port that plays
//! both the GitHub side (token exchange, user lookup) and the Copilot API
//! side (chat, embeddings, models). It counts calls so tests can assert
//! how often the gateway reached out.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;

use copilot_gateway::config::Config;
use copilot_gateway::proxy::AppState;

/// Model name that makes the mock stream three events then abort.
pub const BROKEN_STREAM_MODEL: &str = "broken-stream";
/// Model name that makes the mock answer 429.
pub const RATE_LIMITED_MODEL: &str = "rate-limited";

/// Call counters and knobs for the mock upstream.
pub struct MockState {
    pub exchange_calls: AtomicUsize,
    pub identity_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// `exp=` attribute of the next issued upstream credential.
    pub expires_at: AtomicI64,
    pub fail_exchange: AtomicBool,
    /// Artificial latency of the exchange endpoint, in milliseconds.
    pub exchange_delay_ms: AtomicUsize,
}

impl MockState {
    fn new() -> Self {
        Self {
            exchange_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            expires_at: AtomicI64::new(chrono::Utc::now().timestamp() + 3600),
            fail_exchange: AtomicBool::new(false),
            exchange_delay_ms: AtomicUsize::new(0),
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }
}

pub struct MockUpstream {
    pub base: String,
    pub state: Arc<MockState>,
}

fn header_str(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(Value::from)
        .unwrap_or(Value::Null)
}

async fn token(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let n = state.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    let delay = state.exchange_delay_ms.load(Ordering::SeqCst) as u64;
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("token gh"))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})))
            .into_response();
    }

    if state.fail_exchange.load(Ordering::SeqCst) {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    }

    let exp = state.expires_at.load(Ordering::SeqCst);
    Json(json!({
        "token": format!("tid=mock{};exp={};sku=free_limited", n, exp),
        "expires_at": exp,
    }))
    .into_response()
}

async fn user(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.identity_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"login": "octocat", "id": 1}))
}

fn sse_chunks(chunks: Vec<Result<Bytes, std::io::Error>>) -> Response {
    let stream = futures::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        chunk
    });
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    let model = body["model"].as_str().unwrap_or_default().to_string();

    if model == RATE_LIMITED_MODEL {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    if model == BROKEN_STREAM_MODEL {
        return sse_chunks(vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Ok(Bytes::from_static(b"data: two\n\n")),
            Ok(Bytes::from_static(b"data: three\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "upstream reset")),
        ]);
    }

    if body["stream"] == json!(true) {
        return sse_chunks(vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
            )),
        ]);
    }

    let first_image = body["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|m| m["content"].as_array())
        .flatten()
        .find(|item| item["type"] == "image_url")
        .map(|item| item["image_url"]["url"].clone())
        .unwrap_or(Value::Null);

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "mock response"},
            "finish_reason": "stop"
        }],
        "echo": {
            "stream": body["stream"],
            "authorization": header_str(&headers, "authorization"),
            "intent": header_str(&headers, "openai-intent"),
            "vision": header_str(&headers, "copilot-vision-request"),
            "first_image": first_image,
        }
    }))
    .into_response()
}

async fn embeddings(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2]}],
        "model": body["model"],
        "echo": {"intent": header_str(&headers, "openai-intent")}
    }))
}

async fn models(headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "gpt-4o", "object": "model"}],
        "echo": {"intent": header_str(&headers, "openai-intent")}
    }))
}

async fn image() -> impl IntoResponse {
    ([("content-type", "image/png")], Bytes::from_static(b"\x89PNG"))
}

/// Start the mock upstream on a random local port.
pub async fn start_mock_upstream() -> MockUpstream {
    let state = Arc::new(MockState::new());
    let app = Router::new()
        .route("/token", get(token))
        .route("/user", get(user))
        .route("/chat/completions", post(chat))
        .route("/embeddings", post(embeddings))
        .route("/models", get(models))
        .route("/image.png", get(image))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockUpstream {
        base: format!("http://127.0.0.1:{}", addr.port()),
        state,
    }
}

/// Gateway wired to a mock upstream and a throwaway database.
pub struct TestGateway {
    pub state: AppState,
    pub mock: MockUpstream,
    _db_dir: TempDir,
}

impl TestGateway {
    pub fn router(&self) -> Router {
        copilot_gateway::proxy::create_router(self.state.clone())
    }
}

pub fn test_config(mock: &MockUpstream, db_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.database.path = db_dir.path().join("tokens.db").display().to_string();
    config.upstream.api_base = mock.base.clone();
    config.upstream.token_url = format!("{}/token", mock.base);
    config.upstream.user_url = format!("{}/user", mock.base);
    config.upstream.connect_timeout_secs = 5;
    config.upstream.request_timeout_secs = 10;
    config.upstream.stream_poll_ms = 10;
    config
}

pub async fn start_gateway() -> TestGateway {
    let mock = start_mock_upstream().await;
    let db_dir = tempfile::tempdir().expect("temp dir");
    let config = test_config(&mock, &db_dir);
    let state = AppState::build(config).await.expect("build gateway state");
    TestGateway {
        state,
        mock,
        _db_dir: db_dir,
    }
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
