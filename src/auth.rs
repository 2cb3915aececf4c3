//! Caller credential extraction.
//!
//! Callers present a long-lived GitHub OAuth token as
//! `Authorization: Bearer <token>`. Only user-to-server (`ghu`) and OAuth
//! app (`gho`) tokens are accepted; anything else is rejected before any
//! upstream call is made.

use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Prefixes a caller credential must start with.
pub const CALLER_CREDENTIAL_PREFIXES: [&str; 2] = ["ghu", "gho"];

/// Long-lived credential presented by a caller, redacted in Debug/Display.
#[derive(Clone)]
pub struct CallerCredential(SecretString);

impl CallerCredential {
    /// Access the raw token. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// Short, log-safe rendering such as `ghu_…a1b2`.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.expose_secret())
    }
}

impl std::fmt::Debug for CallerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for CallerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<&str> for CallerCredential {
    fn from(s: &str) -> Self {
        CallerCredential(SecretString::from(s.to_string()))
    }
}

/// Render a token for logs without revealing it.
pub fn fingerprint(token: &str) -> String {
    let head: String = token.chars().take(4).collect();
    let tail: String = {
        let chars: Vec<char> = token.chars().collect();
        let start = chars.len().saturating_sub(4).max(head.chars().count());
        chars[start..].iter().collect()
    };
    format!("{}…{}", head, tail)
}

/// Extract and validate the caller credential from request headers.
pub fn caller_credential(headers: &HeaderMap) -> Result<CallerCredential, Error> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Auth("Token is invalid.".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| Error::Auth("Token is invalid.".to_string()))?;

    if token.is_empty() {
        return Err(Error::Auth("Token is empty.".to_string()));
    }

    if !CALLER_CREDENTIAL_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
    {
        return Err(Error::Auth("Invalid token prefix.".to_string()));
    }

    Ok(CallerCredential::from(token))
}
