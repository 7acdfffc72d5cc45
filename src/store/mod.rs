//! Persistence layer.
//!
//! Each durable store owns its own SQLite database file under the data
//! directory. Records are self-describing JSON blobs keyed by hash, so the
//! engine underneath is substitutable as long as it offers puts, point gets,
//! deletes, and ordered scans.

pub mod credentials;
pub mod outcome;
pub mod retention;

pub use credentials::CredentialsStore;
pub use outcome::{FailureRecord, FailureStore, SuccessRecord, SuccessStore};

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};

use crate::error::Result;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default connection pool size per store.
const DEFAULT_POOL_SIZE: u32 = 5;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Open (or create) the database file backing a store.
///
/// WAL journaling plus `synchronous=FULL` so that every committed put is on
/// disk when the call returns.
pub async fn open_pool(path: &Path) -> Result<DbPool> {
    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// Open an in-memory database, for tests.
///
/// A memory database exists per connection, so the pool is pinned to a
/// single connection.
pub async fn open_memory_pool() -> Result<DbPool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await?;
    Ok(pool)
}

/// Create the single key/value table used by every store.
pub(crate) async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS records (hash TEXT PRIMARY KEY, body TEXT NOT NULL)")
        .execute(pool)
        .await?;
    Ok(())
}
