use anyhow::Result;
use sqlx::prelude::FromRow;
use sqlx::SqlitePool;
use tokio::time::sleep;

use crate::{is_busy, BUSY_BACKOFF, BUSY_RETRIES};

#[derive(FromRow, Debug)]
pub struct ChatMessageRow {
    pub id: i64,
    pub paste_id: String,
    pub ct: String,
    pub iv: String,
    pub created_ts: i64,
}

pub async fn init_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paste_id TEXT NOT NULL REFERENCES pastes (id) ON DELETE CASCADE,
    ct TEXT NOT NULL,
    iv TEXT NOT NULL,
    created_ts INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS chat_paste_created ON chat_messages (paste_id, created_ts)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub enum AppendOutcome {
    /// Message stored; carries the message count after ring trimming.
    Appended(i64),
    ParentNotFound,
    ChatDisabled,
}

/// Insert a message for a live, chat-enabled paste and trim the ring to
/// `max` messages, oldest first by `(created_ts, id)`, in one transaction.
pub async fn append(
    pool: &SqlitePool,
    paste_id: &str,
    ct: &str,
    iv: &str,
    now: i64,
    max: i64,
) -> Result<AppendOutcome> {
    let mut attempt = 0;
    loop {
        match try_append(pool, paste_id, ct, iv, now, max).await {
            Err(err) if is_busy(&err) && attempt < BUSY_RETRIES => {
                attempt += 1;
                sleep(BUSY_BACKOFF).await;
            }
            Err(err) => return Err(err.into()),
            Ok(outcome) => return Ok(outcome),
        }
    }
}

async fn try_append(
    pool: &SqlitePool,
    paste_id: &str,
    ct: &str,
    iv: &str,
    now: i64,
    max: i64,
) -> Result<AppendOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let parent = sqlx::query_as::<_, (i64, bool)>(
        "SELECT expire_ts, allow_chat FROM pastes WHERE id = ?",
    )
    .bind(paste_id)
    .fetch_optional(&mut *tx)
    .await?;
    match parent {
        None => return Ok(AppendOutcome::ParentNotFound),
        Some((expire_ts, _)) if expire_ts < now => {
            drop(tx);
            crate::paste::reap_one(pool, paste_id, now).await?;
            return Ok(AppendOutcome::ParentNotFound);
        }
        Some((_, false)) => return Ok(AppendOutcome::ChatDisabled),
        Some(_) => {}
    }

    sqlx::query("INSERT INTO chat_messages (paste_id, ct, iv, created_ts) VALUES (?, ?, ?, ?)")
        .bind(paste_id)
        .bind(ct)
        .bind(iv)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "DELETE FROM chat_messages WHERE paste_id = ?1 AND id NOT IN \
         (SELECT id FROM chat_messages WHERE paste_id = ?1 ORDER BY created_ts DESC, id DESC LIMIT ?2)",
    )
    .bind(paste_id)
    .bind(max)
    .execute(&mut *tx)
    .await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE paste_id = ?")
        .bind(paste_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(AppendOutcome::Appended(count))
}

/// Messages oldest-to-newest, or `None` when the paste is missing or expired.
pub async fn list(
    pool: &SqlitePool,
    paste_id: &str,
    now: i64,
) -> Result<Option<Vec<ChatMessageRow>>> {
    let mut tx = pool.begin().await?;

    let parent: Option<i64> = sqlx::query_scalar("SELECT expire_ts FROM pastes WHERE id = ?")
        .bind(paste_id)
        .fetch_optional(&mut *tx)
        .await?;
    match parent {
        None => Ok(None),
        Some(expire_ts) if expire_ts < now => {
            drop(tx);
            crate::paste::reap_one(pool, paste_id, now).await?;
            Ok(None)
        }
        Some(_) => {
            let messages = sqlx::query_as::<_, ChatMessageRow>(
                "SELECT * FROM chat_messages WHERE paste_id = ? ORDER BY created_ts ASC, id ASC",
            )
            .bind(paste_id)
            .fetch_all(&mut *tx)
            .await?;
            Ok(Some(messages))
        }
    }
}

pub async fn count(pool: &SqlitePool, paste_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE paste_id = ?")
        .bind(paste_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paste::{self, PasteRow};

    async fn insert_parent(pool: &SqlitePool, id: &str, allow_chat: bool, expire_ts: i64) {
        let row = PasteRow {
            id: id.to_string(),
            ct: "Y2lwaGVydGV4dA".to_string(),
            iv: "AAECAwQFBgcICQoL".to_string(),
            mime: "text/plain".to_string(),
            expire_ts,
            single_view: false,
            views_allowed: 1,
            allow_chat,
            delete_auth_hash: vec![7; 32],
            created_ts: 1000,
        };
        paste::insert(pool, &row).await.unwrap();
    }

    #[tokio::test]
    async fn append_and_list_in_order() {
        let pool = crate::init_in_memory().await.unwrap();
        insert_parent(&pool, "AbCdEfGhJk", true, 9000).await;

        for (i, ts) in [(0i64, 1000i64), (1, 1001), (2, 1002)] {
            let outcome = append(&pool, "AbCdEfGhJk", &format!("bXNn-{i}"), "aXY", ts, 50)
                .await
                .unwrap();
            assert!(matches!(outcome, AppendOutcome::Appended(n) if n == i + 1));
        }

        let messages = list(&pool, "AbCdEfGhJk", 1000).await.unwrap().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].created_ts, 1000);
        assert_eq!(messages[2].created_ts, 1002);
    }

    #[tokio::test]
    async fn parent_checks_gate_appends() {
        let pool = crate::init_in_memory().await.unwrap();
        insert_parent(&pool, "noChatAAAA", false, 9000).await;
        insert_parent(&pool, "expiredAAA", true, 2000).await;

        assert!(matches!(
            append(&pool, "missing", "Y3Q", "aXY", 1000, 50).await.unwrap(),
            AppendOutcome::ParentNotFound
        ));
        assert!(matches!(
            append(&pool, "noChatAAAA", "Y3Q", "aXY", 1000, 50).await.unwrap(),
            AppendOutcome::ChatDisabled
        ));
        assert!(matches!(
            append(&pool, "expiredAAA", "Y3Q", "aXY", 3000, 50).await.unwrap(),
            AppendOutcome::ParentNotFound
        ));
        // The expired parent was reaped by the failed append.
        assert!(matches!(
            paste::get(&pool, "expiredAAA", 1000).await.unwrap(),
            paste::GetOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn ring_evicts_oldest_within_the_insert() {
        let pool = crate::init_in_memory().await.unwrap();
        insert_parent(&pool, "AbCdEfGhJk", true, 99_000).await;

        for i in 0..55i64 {
            let outcome = append(&pool, "AbCdEfGhJk", &format!("bXNn-{i}"), "aXY", 1000 + i, 50)
                .await
                .unwrap();
            let expected = (i + 1).min(50);
            assert!(matches!(outcome, AppendOutcome::Appended(n) if n == expected));
        }

        let messages = list(&pool, "AbCdEfGhJk", 2000).await.unwrap().unwrap();
        assert_eq!(messages.len(), 50);
        // The five oldest fell off the ring.
        assert_eq!(messages[0].ct, "bXNn-5");
        assert_eq!(messages[49].ct, "bXNn-54");
    }

    #[tokio::test]
    async fn chat_rows_cascade_with_their_paste() {
        let pool = crate::init_in_memory().await.unwrap();
        insert_parent(&pool, "AbCdEfGhJk", true, 9000).await;
        for i in 0..3 {
            append(&pool, "AbCdEfGhJk", &format!("bXNn-{i}"), "aXY", 1000 + i, 50)
                .await
                .unwrap();
        }
        assert_eq!(count(&pool, "AbCdEfGhJk").await.unwrap(), 3);

        paste::delete(&pool, "AbCdEfGhJk").await.unwrap();
        assert_eq!(count(&pool, "AbCdEfGhJk").await.unwrap(), 0);
        assert!(list(&pool, "AbCdEfGhJk", 1000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_of_expired_parent_is_none_and_reaps() {
        let pool = crate::init_in_memory().await.unwrap();
        insert_parent(&pool, "expiredAAA", true, 2000).await;
        append(&pool, "expiredAAA", "Y3Q", "aXY", 1000, 50).await.unwrap();

        assert!(list(&pool, "expiredAAA", 3000).await.unwrap().is_none());
        assert_eq!(count(&pool, "expiredAAA").await.unwrap(), 0);
    }
}
