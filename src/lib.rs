//! copilot-gateway - OpenAI-compatible gateway in front of GitHub Copilot
//!
//! This library provides the core functionality for the gateway, including
//! configuration, caller authentication, upstream credential caching and
//! the streaming relay.

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod headers;
pub mod proxy;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
