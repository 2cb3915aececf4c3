//! HTTP gateway module.
//!
//! This module provides the OpenAI-compatible HTTP API that accepts
//! requests, swaps the caller credential for an upstream one and relays
//! the call to the Copilot API.

pub mod forward;
mod handlers;
pub mod images;
pub mod relay;
mod server;
pub mod stream;
pub mod transform;

pub use forward::NormalResponseForwarder;
pub use relay::{RelayChannel, Take};
pub use server::{bind_listener, create_router, run_server, AppState};
pub use stream::{error_event, LineSplitter, StreamRelay};
pub use transform::{RequestTransformer, TransformedRequest, DEFAULT_MODEL};
