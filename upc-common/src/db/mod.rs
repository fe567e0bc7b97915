//! Database connection setup, schema creation and lock-retry helper

pub mod init;
pub mod retry;

pub use init::*;
pub use retry::retry_on_lock;
