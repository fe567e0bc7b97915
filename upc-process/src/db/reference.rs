//! Reference table lookups (targets, instruments, keyword types)
//!
//! These tables are curated outside the worker and only read here.

use sqlx::{Row, SqliteConnection, SqlitePool};

/// One `keywords` row
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTypeRow {
    pub typeid: i64,
    pub typename: String,
    pub instrumentid: i64,
}

/// Target id by (already upper-cased) target name
pub async fn find_target_id(conn: &mut SqliteConnection, target_name: &str) -> sqlx::Result<Option<i64>> {
    let row = sqlx::query("SELECT targetid FROM targets WHERE targetname = ? LIMIT 1")
        .bind(target_name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("targetid")))
}

pub async fn find_instrument_id(conn: &mut SqliteConnection, instrument: &str) -> sqlx::Result<Option<i64>> {
    let row = sqlx::query("SELECT instrumentid FROM instruments WHERE instrument = ? ORDER BY instrumentid LIMIT 1")
        .bind(instrument)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("instrumentid")))
}

/// Every keyword type, ordered by typeid
pub async fn load_keyword_types(pool: &SqlitePool) -> sqlx::Result<Vec<KeywordTypeRow>> {
    let rows = sqlx::query("SELECT typeid, typename, instrumentid FROM keywords ORDER BY typeid")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| KeywordTypeRow {
            typeid: row.get("typeid"),
            typename: row.get("typename"),
            instrumentid: row.get("instrumentid"),
        })
        .collect())
}
