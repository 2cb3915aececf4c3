//! Persistent mapping from caller credential to cached upstream credential.
//!
//! All operations are point lookups or writes keyed by the caller credential;
//! the `caller_credential` column carries a unique index.

use sqlx::SqlitePool;

/// One caller's relationship to the upstream service.
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CredentialRecord {
    pub caller_credential: String,
    pub upstream_credential: Option<String>,
    pub expires_at: Option<i64>,
    pub identity_label: Option<String>,
}

impl CredentialRecord {
    /// Whether the cached upstream credential can be used at `now` (epoch seconds).
    ///
    /// An absent or empty credential is never usable, and a credential whose
    /// expiry is at or before `now` is stale.
    pub fn is_usable_at(&self, now: i64) -> bool {
        match (&self.upstream_credential, self.expires_at) {
            (Some(token), Some(expiry)) => !token.is_empty() && expiry > now,
            _ => false,
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("caller_credential", &"[REDACTED]")
            .field(
                "upstream_credential",
                &self.upstream_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("identity_label", &self.identity_label)
            .finish()
    }
}

/// SQLite-backed credential store.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether a record exists for `caller_credential`.
    pub async fn exists(&self, caller_credential: &str) -> Result<bool, sqlx::Error> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM credentials WHERE caller_credential = ?")
                .bind(caller_credential)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Fetch the record for `caller_credential`, if any.
    pub async fn get(
        &self,
        caller_credential: &str,
    ) -> Result<Option<CredentialRecord>, sqlx::Error> {
        sqlx::query_as::<_, CredentialRecord>(
            "SELECT caller_credential, upstream_credential, expires_at, identity_label
             FROM credentials WHERE caller_credential = ?",
        )
        .bind(caller_credential)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert or refresh a record.
    ///
    /// The upstream credential and expiry are always overwritten. An existing
    /// identity label is kept when `record.identity_label` is `None`.
    pub async fn upsert(&self, record: &CredentialRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO credentials (caller_credential, upstream_credential, expires_at, identity_label)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(caller_credential) DO UPDATE SET
                upstream_credential = excluded.upstream_credential,
                expires_at = excluded.expires_at,
                identity_label = COALESCE(excluded.identity_label, credentials.identity_label)",
        )
        .bind(&record.caller_credential)
        .bind(&record.upstream_credential)
        .bind(record.expires_at)
        .bind(&record.identity_label)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set the identity label for an existing record.
    ///
    /// Returns `false` when no record matched.
    pub async fn update_identity(
        &self,
        caller_credential: &str,
        label: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE credentials SET identity_label = ? WHERE caller_credential = ?")
                .bind(label)
                .bind(caller_credential)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
