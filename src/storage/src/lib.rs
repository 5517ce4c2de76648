use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions as _, SqlitePool};

pub mod chat;
pub mod paste;

/// Open the database file (creating it if missing) and prepare the schema.
/// Foreign keys are enabled per connection; chat rows cascade with their
/// paste through them.
pub async fn init(path: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .disable_statement_logging();
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(opts)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database for tests. One pinned connection
/// keeps every caller on the same database and serializes transactions;
/// recycling it would silently start an empty database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
        .foreign_keys(true)
        .disable_statement_logging();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    paste::init_table(pool).await?;
    chat::init_table(pool).await?;
    Ok(())
}

pub(crate) const BUSY_RETRIES: u32 = 3;
pub(crate) const BUSY_BACKOFF: Duration = Duration::from_millis(50);

pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}
