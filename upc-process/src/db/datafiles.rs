//! Data file identity rows
//!
//! A row is keyed by the toolkit identifier (`isisid`) once one is known, or
//! by the canonical source URL (`edr_source`) for items that failed before
//! conversion. Rows are created on first encounter and never deleted here.

use sqlx::{Row, SqliteConnection};

/// Stored identity row
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub upcid: i64,
    pub isisid: Option<String>,
    pub productid: Option<String>,
    pub edr_source: Option<String>,
    pub instrumentid: Option<i64>,
    pub targetid: Option<i64>,
}

/// Values for a new identity row
#[derive(Debug, Clone, Default)]
pub struct NewDataFile {
    pub isisid: Option<String>,
    pub productid: Option<String>,
    pub edr_source: String,
    pub instrumentid: Option<i64>,
    pub targetid: Option<i64>,
}

impl NewDataFile {
    /// Row known only by its source URL
    pub fn source_only(edr_source: impl Into<String>) -> Self {
        Self {
            edr_source: edr_source.into(),
            ..Default::default()
        }
    }
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> DataFile {
    DataFile {
        upcid: row.get("upcid"),
        isisid: row.get("isisid"),
        productid: row.get("productid"),
        edr_source: row.get("edr_source"),
        instrumentid: row.get("instrumentid"),
        targetid: row.get("targetid"),
    }
}

pub async fn find_by_isisid(conn: &mut SqliteConnection, isisid: &str) -> sqlx::Result<Option<DataFile>> {
    let row = sqlx::query(
        r#"
        SELECT upcid, isisid, productid, edr_source, instrumentid, targetid
        FROM datafiles
        WHERE isisid = ?
        "#,
    )
    .bind(isisid)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(from_row))
}

/// Oldest row for a source URL
pub async fn find_by_source(conn: &mut SqliteConnection, edr_source: &str) -> sqlx::Result<Option<DataFile>> {
    let row = sqlx::query(
        r#"
        SELECT upcid, isisid, productid, edr_source, instrumentid, targetid
        FROM datafiles
        WHERE edr_source = ?
        ORDER BY upcid
        LIMIT 1
        "#,
    )
    .bind(edr_source)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(from_row))
}

/// Insert a row and return its upcid
///
/// A concurrent insert of the same `isisid` is absorbed by the unique
/// constraint and the existing row's id is returned.
pub async fn insert(conn: &mut SqliteConnection, file: &NewDataFile) -> sqlx::Result<i64> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO datafiles (isisid, productid, edr_source, edr_detached_label, instrumentid, targetid)
        VALUES (?, ?, ?, '', ?, ?)
        ON CONFLICT(isisid) DO NOTHING
        RETURNING upcid
        "#,
    )
    .bind(&file.isisid)
    .bind(&file.productid)
    .bind(&file.edr_source)
    .bind(file.instrumentid)
    .bind(file.targetid)
    .fetch_optional(&mut *conn)
    .await?;

    match (inserted, &file.isisid) {
        (Some(row), _) => Ok(row.get("upcid")),
        (None, Some(isisid)) => find_by_isisid(conn, isisid)
            .await?
            .map(|f| f.upcid)
            .ok_or(sqlx::Error::RowNotFound),
        (None, None) => Err(sqlx::Error::RowNotFound),
    }
}

/// Row keyed by toolkit identifier, created from `file` when absent
pub async fn ensure_by_isisid(conn: &mut SqliteConnection, file: &NewDataFile) -> sqlx::Result<i64> {
    let Some(isisid) = file.isisid.as_deref() else {
        return Err(sqlx::Error::Protocol("identity row requires an isisid".into()));
    };
    match find_by_isisid(conn, isisid).await? {
        Some(existing) => Ok(existing.upcid),
        None => insert(conn, file).await,
    }
}

/// Row keyed by source URL, created with no toolkit identifier when absent
pub async fn ensure_by_source(conn: &mut SqliteConnection, edr_source: &str) -> sqlx::Result<i64> {
    match find_by_source(conn, edr_source).await? {
        Some(existing) => Ok(existing.upcid),
        None => insert(conn, &NewDataFile::source_only(edr_source)).await,
    }
}

pub async fn count(conn: &mut SqliteConnection) -> sqlx::Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM datafiles")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("count"))
}
