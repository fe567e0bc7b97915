//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Format used for process dates in metadata and audit rows
pub const PROCESS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time rendered as a process date
pub fn process_date() -> String {
    format_process_date(now())
}

/// Render a timestamp as a process date
pub fn format_process_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format(PROCESS_DATE_FORMAT).to_string()
}
