//! SQLite storage for cached upstream credentials.

pub mod credentials;

pub use credentials::{CredentialRecord, CredentialStore};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Connections in the credential pool.
///
/// Every store access runs under the broker's resolve lock, so the pool
/// stays small.
const MAX_CONNECTIONS: u32 = 2;

/// Open the credential database at `db_path` and apply embedded migrations.
///
/// The file is created on first start so cached upstream credentials
/// survive restarts. WAL with `NORMAL` sync keeps a credential refresh to a
/// single log append, and `busy_timeout` makes a second process opening the
/// same file wait instead of failing with `SQLITE_BUSY`.
pub async fn init_pool(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(opts)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::debug!(path = %db_path, "Credential migrations applied");

    Ok(pool)
}
