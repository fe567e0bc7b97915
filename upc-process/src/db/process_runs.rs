//! Process-run audit rows (PDS database)

use sqlx::{Row, SqlitePool};
use upc_common::time;

/// Process type recorded for UPC ingestion
pub const PROCESS_TYPE_UPC: i64 = 5;

/// Record the outcome of one processing attempt for a catalog file
///
/// One row per (file, process type): a later attempt overwrites the earlier.
pub async fn record(pool: &SqlitePool, file_id: i64, outcome: bool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO process_runs (fileid, process_typeid, process_date, process_out)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(fileid, process_typeid) DO UPDATE SET
            process_date = excluded.process_date,
            process_out = excluded.process_out
        "#,
    )
    .bind(file_id)
    .bind(PROCESS_TYPE_UPC)
    .bind(time::process_date())
    .bind(outcome)
    .execute(pool)
    .await?;

    Ok(())
}

/// Last recorded outcome for a file, if any
pub async fn outcome(pool: &SqlitePool, file_id: i64) -> sqlx::Result<Option<bool>> {
    let row = sqlx::query(
        "SELECT process_out FROM process_runs WHERE fileid = ? AND process_typeid = ?",
    )
    .bind(file_id)
    .bind(PROCESS_TYPE_UPC)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get("process_out")))
}
