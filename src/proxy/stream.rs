//! Streaming relay from an upstream event stream to the client.
//!
//! A detached producer task fetches the upstream response and pushes each
//! complete line into a shared [`RelayChannel`]. The response body is a
//! pull-driven stream that drains the channel with a bounded wait per poll.
//! Handles TCP chunk boundary reassembly: lines split across chunks are
//! reassembled before being forwarded.
//!
//! The body owns a [`DropGuard`] for the producer's cancellation token, so
//! a client that goes away stops the upstream fetch instead of leaving it
//! running to completion.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::forward::NormalResponseForwarder;
use super::relay::{RelayChannel, Take};
use super::transform::TransformedRequest;
use crate::error::Error;

/// Splits a byte stream into newline-terminated lines.
///
/// Each emitted line keeps its trailing `\n`, so forwarding the lines in
/// order reproduces the upstream bytes exactly.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset + 1;
            lines.push(Bytes::copy_from_slice(&self.buffer[start..end]));
            start = end;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Return whatever trails the last newline, if anything.
    pub fn finish(self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(Bytes::from(self.buffer))
        }
    }
}

/// Synthetic SSE event reporting a relay failure to the client.
pub fn error_event(message: &str) -> Bytes {
    let payload = serde_json::json!({ "error": message });
    Bytes::from(format!("data: {}\n\n", payload))
}

/// How the producer's upstream read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Completed { lines: usize },
    Failed { lines: usize },
    Cancelled { lines: usize },
}

/// Copy lines from `upstream` into `channel` until it ends, fails or is cancelled.
///
/// A read failure pushes one [`error_event`]. The channel is not marked
/// finished here; that is the caller's job.
pub async fn pump<S, E>(
    upstream: S,
    channel: &RelayChannel,
    cancel: &CancellationToken,
) -> PumpOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    futures::pin_mut!(upstream);
    let mut splitter = LineSplitter::new();
    let mut lines = 0;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return PumpOutcome::Cancelled { lines },
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for line in splitter.push(&chunk) {
                    channel.push(line);
                    lines += 1;
                }
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, lines, "Upstream stream failed mid-relay");
                if let Some(rest) = splitter.finish() {
                    channel.push(rest);
                    lines += 1;
                }
                channel.push(error_event(&e.to_string()));
                return PumpOutcome::Failed { lines };
            }
            None => break,
        }
    }

    if let Some(rest) = splitter.finish() {
        channel.push(rest);
        lines += 1;
    }
    PumpOutcome::Completed { lines }
}

/// Spawn the producer for one streaming request.
///
/// The task owns its own handle to `channel` and always marks it finished
/// before exiting, whatever the outcome.
pub fn spawn_producer(
    client: reqwest::Client,
    url: String,
    request: TransformedRequest,
    channel: Arc<RelayChannel>,
    cancel: CancellationToken,
) -> JoinHandle<PumpOutcome> {
    tokio::spawn(async move {
        let send = client
            .post(&url)
            .headers(request.headers)
            .json(&request.body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(
                    model = %request.model,
                    "Client left before upstream answered"
                );
                channel.mark_finished();
                return PumpOutcome::Cancelled { lines: 0 };
            }
            response = send => response,
        };

        let outcome = match response {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    tracing::warn!(
                        status = %status,
                        model = %request.model,
                        "Upstream returned non-success status on stream, relaying body"
                    );
                }
                pump(response.bytes_stream(), &channel, &cancel).await
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    model = %request.model,
                    "Upstream stream request failed"
                );
                channel.push(error_event(&e.to_string()));
                PumpOutcome::Failed { lines: 0 }
            }
        };

        channel.mark_finished();
        tracing::debug!(model = %request.model, outcome = ?outcome, "Stream producer finished");
        outcome
    })
}

/// Drain `channel` as a stream of chunks, ending when it is closed.
///
/// `guard` is held for the life of the stream; dropping the stream cancels
/// the producer.
pub fn drain(
    channel: Arc<RelayChannel>,
    poll: Duration,
    guard: DropGuard,
) -> impl Stream<Item = Bytes> + Send + 'static {
    futures::stream::unfold((channel, guard), move |(channel, guard)| async move {
        loop {
            match channel.try_take(poll).await {
                Take::Data(chunk) => return Some((chunk, (channel, guard))),
                Take::Empty => continue,
                Take::Closed => return None,
            }
        }
    })
}

/// Response body that drains `channel`.
pub fn relay_body(channel: Arc<RelayChannel>, poll: Duration, guard: DropGuard) -> Body {
    Body::from_stream(drain(channel, poll, guard).map(Ok::<_, Infallible>))
}

/// Relays chat completions, streaming or not.
#[derive(Clone)]
pub struct StreamRelay {
    client: reqwest::Client,
    forwarder: NormalResponseForwarder,
    poll: Duration,
}

impl StreamRelay {
    pub fn new(client: reqwest::Client, poll: Duration) -> Self {
        Self {
            forwarder: NormalResponseForwarder::new(client.clone()),
            client,
            poll,
        }
    }

    /// Send `request` to `url` and build the client response.
    ///
    /// Non-streaming requests are handed to the [`NormalResponseForwarder`].
    /// Streaming requests get SSE headers immediately; upstream failures
    /// after that point arrive in-band as an [`error_event`].
    pub async fn run(&self, url: &str, request: TransformedRequest) -> Result<Response, Error> {
        if !request.is_streaming {
            return self
                .forwarder
                .run(Method::POST, url, request.headers, Some(&request.body))
                .await;
        }

        tracing::info!(model = %request.model, "Starting stream relay");

        let channel = Arc::new(RelayChannel::new());
        let cancel = CancellationToken::new();
        spawn_producer(
            self.client.clone(),
            url.to_string(),
            request,
            channel.clone(),
            cancel.clone(),
        );

        let body = relay_body(channel, self.poll, cancel.drop_guard());
        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        Ok(response)
    }
}
