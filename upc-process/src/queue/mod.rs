//! Work queue and queue lock services
//!
//! The consumer only needs a FIFO queue with an atomic pop and a per-queue
//! enable flag. Both are traits so a different backing service can be
//! dropped in; the SQLite implementations live in the PDS database.

mod sqlite;

pub use sqlite::{SqliteQueueLock, SqliteWorkQueue};

use async_trait::async_trait;
use upc_common::Result;

/// Default queue drained by the worker
pub const DEFAULT_QUEUE: &str = "UPC_ReadyQueue";

/// Default lock gating the queue
pub const DEFAULT_LOCK: &str = "processing";

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Number of queued payloads
    async fn size(&self, queue: &str) -> Result<i64>;

    /// Remove and return the oldest payload; atomic across consumers
    async fn pop(&self, queue: &str) -> Result<Option<String>>;

    async fn push(&self, queue: &str, payload: &str) -> Result<()>;
}

#[async_trait]
pub trait QueueLock: Send + Sync {
    /// Add the queue to the lock, enabled, unless already present
    async fn register(&self, queue: &str) -> Result<()>;

    /// Whether items may be taken from the queue
    async fn available(&self, queue: &str) -> Result<bool>;

    async fn set_enabled(&self, queue: &str, enabled: bool) -> Result<()>;
}
