//! Queue item model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file to process
///
/// Encoded on the queue as a JSON array `[source_path, file_id, archive]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub source_path: PathBuf,
    /// Identifier of the file in the PDS catalog (audit key)
    pub file_id: i64,
    pub archive: String,
}

impl WorkItem {
    pub fn new(source_path: impl Into<PathBuf>, file_id: i64, archive: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            file_id,
            archive: archive.into(),
        }
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&(&self.source_path, self.file_id, &self.archive))
    }
}
