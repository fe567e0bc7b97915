//! Engine services

pub mod checksum;
pub mod persistence;

pub use checksum::file_checksum;
pub use persistence::{PersistOutcome, Persistence};
