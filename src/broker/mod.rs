//! Credential broker: turns a caller credential into a valid upstream credential.
//!
//! Resolution runs under a single process-wide lock, so the exchange endpoint
//! never sees concurrent requests from this process. Refreshes are rare
//! compared to request volume, so the coarse lock costs little.

pub mod exchange;

pub use exchange::{extract_expiry, TokenExchange};

use tokio::sync::Mutex;

use crate::auth::CallerCredential;
use crate::error::Error;
use crate::storage::{CredentialRecord, CredentialStore};

/// Resolves caller credentials against the persistent cache.
pub struct CredentialBroker {
    store: CredentialStore,
    exchange: TokenExchange,
    resolve_lock: Mutex<()>,
}

impl CredentialBroker {
    pub fn new(store: CredentialStore, exchange: TokenExchange) -> Self {
        Self {
            store,
            exchange,
            resolve_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a valid upstream credential for `caller`, refreshing if needed.
    ///
    /// Fails with [`Error::ExchangeFailed`] when the exchange call fails and
    /// with [`Error::StoreUnavailable`] when the cache cannot be read or written.
    pub async fn resolve(&self, caller: &CallerCredential) -> Result<String, Error> {
        let _guard = self.resolve_lock.lock().await;

        let now = chrono::Utc::now().timestamp();
        let cached = self.store.get(caller.expose_secret()).await?;

        if let Some(record) = &cached {
            if record.is_usable_at(now) {
                tracing::debug!(
                    caller = %caller.fingerprint(),
                    expires_at = ?record.expires_at,
                    "Upstream credential cache hit"
                );
                if let Some(token) = &record.upstream_credential {
                    return Ok(token.clone());
                }
            }
        }

        tracing::info!(
            caller = %caller.fingerprint(),
            known = cached.is_some(),
            "Upstream credential missing or expired, exchanging"
        );

        let token = self.exchange.exchange(caller).await.map_err(|e| {
            tracing::error!(
                caller = %caller.fingerprint(),
                error = %e,
                "Credential exchange failed"
            );
            e
        })?;
        let expires_at = extract_expiry(&token);

        self.store
            .upsert(&CredentialRecord {
                caller_credential: caller.expose_secret().to_string(),
                upstream_credential: Some(token.clone()),
                expires_at: Some(expires_at),
                identity_label: None,
            })
            .await?;

        tracing::info!(
            caller = %caller.fingerprint(),
            expires_at,
            "Upstream credential refreshed"
        );

        let label_known = cached
            .as_ref()
            .and_then(|record| record.identity_label.as_ref())
            .is_some();
        if !label_known {
            self.learn_identity(caller).await;
        }

        Ok(token)
    }

    /// Best-effort identity lookup; failures are logged, never returned.
    async fn learn_identity(&self, caller: &CallerCredential) {
        match self.exchange.fetch_identity(caller).await {
            Ok(Some(login)) => {
                match self
                    .store
                    .update_identity(caller.expose_secret(), &login)
                    .await
                {
                    Ok(_) => tracing::info!(
                        caller = %caller.fingerprint(),
                        login = %login,
                        "Identity label stored"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Failed to store identity label"),
                }
            }
            Ok(None) => {
                tracing::debug!(caller = %caller.fingerprint(), "Identity lookup returned no login")
            }
            Err(e) => {
                tracing::warn!(caller = %caller.fingerprint(), error = %e, "Identity lookup failed")
            }
        }
    }
}
