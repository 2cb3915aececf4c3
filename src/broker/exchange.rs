//! Upstream credential exchange and identity lookup.

use std::sync::Arc;

use serde::Deserialize;

use crate::auth::CallerCredential;
use crate::config::{Fingerprint, UpstreamConfig};
use crate::error::Error;
use crate::headers;

/// Extract the expiry embedded in an upstream credential.
///
/// The credential is a `;`-delimited attribute string such as
/// `tid=abc;exp=1731950502;sku=free`. Returns 0 when no parsable `exp`
/// attribute is present, which makes the credential immediately stale.
pub fn extract_expiry(token: &str) -> i64 {
    token
        .split(';')
        .find_map(|part| part.trim().strip_prefix("exp="))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: Option<String>,
}

/// Client for the two vendor endpoints keyed by the caller credential.
#[derive(Clone)]
pub struct TokenExchange {
    client: reqwest::Client,
    token_url: String,
    user_url: String,
    fingerprint: Arc<Fingerprint>,
}

impl TokenExchange {
    pub fn new(
        client: reqwest::Client,
        upstream: &UpstreamConfig,
        fingerprint: Arc<Fingerprint>,
    ) -> Self {
        Self {
            client,
            token_url: upstream.token_url.clone(),
            user_url: upstream.user_url.clone(),
            fingerprint,
        }
    }

    /// Exchange a caller credential for a fresh upstream credential.
    pub async fn exchange(&self, caller: &CallerCredential) -> Result<String, Error> {
        let headers = headers::exchange_headers(&self.fingerprint, caller.expose_secret())?;

        let response = self
            .client
            .get(&self.token_url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::ExchangeFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExchangeFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::ExchangeFailed(format!("unreadable response: {}", e)))?;

        match parsed.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(Error::ExchangeFailed(
                "\"token\" field not found in response".to_string(),
            )),
        }
    }

    /// Look up the account login for a caller credential.
    ///
    /// Returns `Ok(None)` when the endpoint answers but carries no login.
    pub async fn fetch_identity(&self, caller: &CallerCredential) -> Result<Option<String>, Error> {
        let headers = headers::identity_headers(&self.fingerprint, caller.expose_secret())?;

        let response = self
            .client
            .get(&self.user_url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus { status, body });
        }

        let user: UserResponse = response.json().await?;
        Ok(user.login.filter(|login| !login.is_empty()))
    }
}
