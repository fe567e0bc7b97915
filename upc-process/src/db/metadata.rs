//! Typed metadata rows
//!
//! One table per keyword type, each keyed by (upcid, typeid). Writes are
//! upserts, so re-processing a file overwrites its values in place.

use sqlx::{Row, SqliteConnection};

/// A coerced keyword value, tagged by the table it belongs in
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Time(String),
    String(String),
    Boolean(bool),
    Double(f64),
    Integer(i64),
    /// Well-known-text geometry
    Geometry(String),
}

impl MetaValue {
    pub fn table(&self) -> &'static str {
        match self {
            MetaValue::Time(_) => "meta_times",
            MetaValue::String(_) => "meta_strings",
            MetaValue::Boolean(_) => "meta_booleans",
            MetaValue::Double(_) => "meta_doubles",
            MetaValue::Integer(_) => "meta_integers",
            MetaValue::Geometry(_) => "meta_geometries",
        }
    }
}

/// Insert or overwrite one metadata value
pub async fn upsert(conn: &mut SqliteConnection, upcid: i64, typeid: i64, value: &MetaValue) -> sqlx::Result<()> {
    let sql = format!(
        "INSERT INTO {} (upcid, typeid, value) VALUES (?, ?, ?) \
         ON CONFLICT(upcid, typeid) DO UPDATE SET value = excluded.value",
        value.table()
    );
    let query = sqlx::query(&sql).bind(upcid).bind(typeid);

    let query = match value {
        MetaValue::Time(v) | MetaValue::String(v) | MetaValue::Geometry(v) => query.bind(v.clone()),
        MetaValue::Boolean(v) => query.bind(*v),
        MetaValue::Double(v) => query.bind(*v),
        MetaValue::Integer(v) => query.bind(*v),
    };

    query.execute(&mut *conn).await?;
    Ok(())
}

/// Remove one metadata value; a missing row is not an error
pub async fn delete(conn: &mut SqliteConnection, table: &str, upcid: i64, typeid: i64) -> sqlx::Result<()> {
    let sql = format!("DELETE FROM {} WHERE upcid = ? AND typeid = ?", table);
    sqlx::query(&sql)
        .bind(upcid)
        .bind(typeid)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert or overwrite one band row
pub async fn upsert_band(
    conn: &mut SqliteConnection,
    upcid: i64,
    filter: &str,
    centerwave: Option<f64>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO meta_bands (upcid, filter, centerwave)
        VALUES (?, ?, ?)
        ON CONFLICT(upcid, filter) DO UPDATE SET centerwave = excluded.centerwave
        "#,
    )
    .bind(upcid)
    .bind(filter)
    .bind(centerwave)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stored text-like value (times, strings, geometries)
pub async fn get_text(
    conn: &mut SqliteConnection,
    table: &str,
    upcid: i64,
    typeid: i64,
) -> sqlx::Result<Option<String>> {
    let sql = format!("SELECT value FROM {} WHERE upcid = ? AND typeid = ?", table);
    let row = sqlx::query(&sql)
        .bind(upcid)
        .bind(typeid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("value")))
}

pub async fn get_boolean(conn: &mut SqliteConnection, upcid: i64, typeid: i64) -> sqlx::Result<Option<bool>> {
    let row = sqlx::query("SELECT value FROM meta_booleans WHERE upcid = ? AND typeid = ?")
        .bind(upcid)
        .bind(typeid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get("value")))
}
