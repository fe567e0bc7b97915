//! SQLite-backed queue and lock

use super::{QueueLock, WorkQueue};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use upc_common::db::retry_on_lock;
use upc_common::Result;

/// Longest time a pop or push waits for another worker's write to finish
const MAX_LOCK_WAIT_MS: u64 = 10_000;

pub struct SqliteWorkQueue {
    pool: SqlitePool,
}

impl SqliteWorkQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn size(&self, queue: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS size FROM work_queue WHERE queue_name = ?")
            .bind(queue)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("size"))
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        // Single statement, so two consumers can never take the same row
        retry_on_lock("queue pop", MAX_LOCK_WAIT_MS, || async {
            let row = sqlx::query(
                r#"
                DELETE FROM work_queue
                WHERE id = (
                    SELECT id FROM work_queue
                    WHERE queue_name = ?
                    ORDER BY id
                    LIMIT 1
                )
                RETURNING payload
                "#,
            )
            .bind(queue)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|r| r.get("payload")))
        })
        .await
    }

    async fn push(&self, queue: &str, payload: &str) -> Result<()> {
        retry_on_lock("queue push", MAX_LOCK_WAIT_MS, || async {
            sqlx::query("INSERT INTO work_queue (queue_name, payload) VALUES (?, ?)")
                .bind(queue)
                .bind(payload)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

/// Enable flags for one named lock
pub struct SqliteQueueLock {
    pool: SqlitePool,
    lock_name: String,
}

impl SqliteQueueLock {
    pub fn new(pool: SqlitePool, lock_name: impl Into<String>) -> Self {
        Self {
            pool,
            lock_name: lock_name.into(),
        }
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }
}

#[async_trait]
impl QueueLock for SqliteQueueLock {
    async fn register(&self, queue: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_locks (lock_name, queue_name, enabled)
            VALUES (?, ?, 1)
            ON CONFLICT(lock_name, queue_name) DO NOTHING
            "#,
        )
        .bind(&self.lock_name)
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// An unregistered queue is not available
    async fn available(&self, queue: &str) -> Result<bool> {
        let row = sqlx::query("SELECT enabled FROM queue_locks WHERE lock_name = ? AND queue_name = ?")
            .bind(&self.lock_name)
            .bind(queue)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<bool, _>("enabled")).unwrap_or(false))
    }

    async fn set_enabled(&self, queue: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_locks (lock_name, queue_name, enabled)
            VALUES (?, ?, ?)
            ON CONFLICT(lock_name, queue_name) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&self.lock_name)
        .bind(queue)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
