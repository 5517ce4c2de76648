use anyhow::Result;
use sqlx::prelude::FromRow;
use sqlx::SqlitePool;
use tokio::time::sleep;

use crate::{is_busy, BUSY_BACKOFF, BUSY_RETRIES};

#[derive(FromRow, Debug, Clone)]
pub struct PasteRow {
    pub id: String,
    pub ct: String,
    pub iv: String,
    pub mime: String,
    pub expire_ts: i64,
    pub single_view: bool,
    pub views_allowed: i64,
    pub allow_chat: bool,
    pub delete_auth_hash: Vec<u8>,
    pub created_ts: i64,
}

pub async fn init_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS pastes (
    id TEXT PRIMARY KEY,
    ct TEXT NOT NULL,
    iv TEXT NOT NULL,
    mime TEXT NOT NULL,
    expire_ts INTEGER NOT NULL,
    single_view INTEGER NOT NULL,
    views_allowed INTEGER NOT NULL,
    allow_chat INTEGER NOT NULL,
    delete_auth_hash BLOB NOT NULL,
    created_ts INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS pastes_expire ON pastes (expire_ts)")
        .execute(pool)
        .await?;

    Ok(())
}

pub enum InsertOutcome {
    Inserted,
    /// Another paste already owns the minted id; the caller retries with a
    /// fresh one.
    IdConflict,
}

pub async fn insert(pool: &SqlitePool, row: &PasteRow) -> Result<InsertOutcome> {
    let mut attempt = 0;
    loop {
        let res = sqlx::query(
            "INSERT INTO pastes \
             (id, ct, iv, mime, expire_ts, single_view, views_allowed, allow_chat, delete_auth_hash, created_ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.ct)
        .bind(&row.iv)
        .bind(&row.mime)
        .bind(row.expire_ts)
        .bind(row.single_view)
        .bind(row.views_allowed)
        .bind(row.allow_chat)
        .bind(&row.delete_auth_hash)
        .bind(row.created_ts)
        .execute(pool)
        .await;

        match res {
            Ok(_) => return Ok(InsertOutcome::Inserted),
            Err(err) => {
                if let sqlx::Error::Database(db) = &err {
                    if db.is_unique_violation() {
                        return Ok(InsertOutcome::IdConflict);
                    }
                }
                if is_busy(&err) && attempt < BUSY_RETRIES {
                    attempt += 1;
                    sleep(BUSY_BACKOFF).await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
}

pub enum ConsumeOutcome {
    Served(PasteRow),
    NotFound,
    /// Existed but is past its expiration; the row has been reaped.
    Gone,
}

/// Read a paste, atomically consuming it when it is single-view. The
/// consuming DELETE is one guarded statement, so concurrent readers of the
/// same paste serialize at the store and at most one of them is served.
pub async fn consume(pool: &SqlitePool, id: &str, now: i64) -> Result<ConsumeOutcome> {
    let consumed = sqlx::query_as::<_, PasteRow>(
        "DELETE FROM pastes WHERE id = ? AND single_view = 1 AND expire_ts >= ? RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    if let Some(row) = consumed {
        return Ok(ConsumeOutcome::Served(row));
    }

    let row = sqlx::query_as::<_, PasteRow>("SELECT * FROM pastes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match row {
        None => Ok(ConsumeOutcome::NotFound),
        Some(row) if row.expire_ts < now => {
            reap_one(pool, id, now).await?;
            Ok(ConsumeOutcome::Gone)
        }
        // Single-view and live, yet the consuming DELETE missed it: another
        // reader won the race between the two statements.
        Some(row) if row.single_view => Ok(ConsumeOutcome::NotFound),
        Some(row) => Ok(ConsumeOutcome::Served(row)),
    }
}

pub enum GetOutcome {
    Found(PasteRow),
    NotFound,
    Gone,
}

/// Fetch without consuming, for delete-auth checks. Expired rows are reaped
/// in place.
pub async fn get(pool: &SqlitePool, id: &str, now: i64) -> Result<GetOutcome> {
    let row = sqlx::query_as::<_, PasteRow>("SELECT * FROM pastes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match row {
        None => Ok(GetOutcome::NotFound),
        Some(row) if row.expire_ts < now => {
            reap_one(pool, id, now).await?;
            Ok(GetOutcome::Gone)
        }
        Some(row) => Ok(GetOutcome::Found(row)),
    }
}

/// Lazy reap of one observed-expired row. The expiry guard keeps it a no-op
/// if anything else got there first.
pub(crate) async fn reap_one(pool: &SqlitePool, id: &str, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM pastes WHERE id = ? AND expire_ts < ?")
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

pub async fn delete(pool: &SqlitePool, id: &str) -> Result<DeleteOutcome> {
    let mut attempt = 0;
    loop {
        let res = sqlx::query("DELETE FROM pastes WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await;
        match res {
            Ok(done) if done.rows_affected() > 0 => return Ok(DeleteOutcome::Deleted),
            Ok(_) => return Ok(DeleteOutcome::NotFound),
            Err(err) if is_busy(&err) && attempt < BUSY_RETRIES => {
                attempt += 1;
                sleep(BUSY_BACKOFF).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Bulk-delete everything past its deadline. Chat rows cascade.
pub async fn reap_expired(pool: &SqlitePool, now: i64) -> Result<u64> {
    let done = sqlx::query("DELETE FROM pastes WHERE expire_ts < ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(done.rows_affected())
}
