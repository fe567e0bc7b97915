//! # UPC processing worker
//!
//! Drains a queue of planetary image files, runs each through its archive's
//! recipe of toolkit steps, and records either the full metadata of the
//! processed product or an error record saying where the recipe stopped.
//!
//! Data flow: [`consumer`] → [`runner`] → success: [`keywords`] extraction →
//! [`services::persistence`]; failure: partial [`label`] → error records.

pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod executor;
pub mod keywords;
pub mod label;
pub mod models;
pub mod queue;
pub mod recipe;
pub mod runner;
pub mod services;
pub mod workspace;

pub use config::UpcConfig;
pub use consumer::{ConsumerStats, QueueConsumer};
pub use error::{ProcessError, ProcessResult};
pub use models::WorkItem;

/// Tracing filter for a configured level
///
/// A bare level applies to this worker's crates; anything containing a
/// directive (`=` or `,`) is used as written.
pub fn log_filter(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("upc_process={level},upc_common={level}")
    }
}
