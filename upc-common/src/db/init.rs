//! Database initialization
//!
//! Two SQLite databases back a worker:
//! - **UPC database**: data file identity rows, typed metadata tables, and the
//!   target/instrument/keyword reference tables
//! - **PDS database**: process-run audit rows plus the work queue and queue
//!   lock tables
//!
//! All `CREATE` statements are idempotent. Reference tables are created empty;
//! their content is curated outside the worker.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Typed metadata tables, one per keyword type
pub const META_TABLES: [&str; 6] = [
    "meta_times",
    "meta_strings",
    "meta_booleans",
    "meta_doubles",
    "meta_integers",
    "meta_geometries",
];

/// Open (creating if needed) a SQLite database file
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets several worker instances read while one writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    Ok(pool)
}

/// Open the UPC database and create its tables
pub async fn init_upc_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = connect(db_path).await?;
    create_upc_schema(&pool).await?;
    Ok(pool)
}

/// Open the PDS database and create its tables
pub async fn init_pds_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = connect(db_path).await?;
    create_pds_schema(&pool).await?;
    Ok(pool)
}

/// Create every UPC table (idempotent)
pub async fn create_upc_schema(pool: &SqlitePool) -> Result<()> {
    create_targets_table(pool).await?;
    create_instruments_table(pool).await?;
    create_keywords_table(pool).await?;
    create_datafiles_table(pool).await?;
    for table in META_TABLES {
        create_meta_table(pool, table).await?;
    }
    create_meta_bands_table(pool).await?;
    Ok(())
}

/// Create every PDS table (idempotent)
pub async fn create_pds_schema(pool: &SqlitePool) -> Result<()> {
    create_process_runs_table(pool).await?;
    create_work_queue_table(pool).await?;
    create_queue_locks_table(pool).await?;
    Ok(())
}

pub async fn create_targets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS targets (
            targetid INTEGER PRIMARY KEY,
            naifid INTEGER,
            targetname TEXT NOT NULL UNIQUE,
            system TEXT,
            displayname TEXT,
            aliases TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_instruments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instruments (
            instrumentid INTEGER PRIMARY KEY,
            instrument TEXT NOT NULL,
            displayname TEXT,
            mission TEXT,
            spacecraft TEXT,
            pdsid TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Keyword-type catalog: (typename, instrumentid) → typeid
///
/// Instrument id 1 is reserved for keywords common to every instrument.
pub async fn create_keywords_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keywords (
            typeid INTEGER PRIMARY KEY,
            typename TEXT NOT NULL,
            displayname TEXT,
            instrumentid INTEGER NOT NULL DEFAULT 1,
            UNIQUE (typename, instrumentid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Data file identity rows
///
/// `isisid` is NULL until the toolkit identifier is known (early-stage
/// failures are identified by `edr_source` instead).
pub async fn create_datafiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datafiles (
            upcid INTEGER PRIMARY KEY AUTOINCREMENT,
            isisid TEXT UNIQUE,
            productid TEXT,
            edr_source TEXT,
            edr_detached_label TEXT,
            instrumentid INTEGER REFERENCES instruments(instrumentid),
            targetid INTEGER REFERENCES targets(targetid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_datafiles_edr_source ON datafiles(edr_source)")
        .execute(pool)
        .await?;

    Ok(())
}

/// One typed metadata table keyed by (upcid, typeid)
async fn create_meta_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let value_type = match table {
        "meta_booleans" | "meta_integers" => "INTEGER",
        "meta_doubles" => "REAL",
        _ => "TEXT",
    };

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            upcid INTEGER NOT NULL REFERENCES datafiles(upcid),
            typeid INTEGER NOT NULL,
            value {value_type},
            PRIMARY KEY (upcid, typeid)
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

pub async fn create_meta_bands_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta_bands (
            upcid INTEGER NOT NULL REFERENCES datafiles(upcid),
            filter TEXT NOT NULL,
            centerwave REAL,
            PRIMARY KEY (upcid, filter)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit rows, one per (file, process type); re-processing overwrites
pub async fn create_process_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS process_runs (
            fileid INTEGER NOT NULL,
            process_typeid INTEGER NOT NULL,
            process_date TEXT NOT NULL,
            process_out INTEGER NOT NULL,
            PRIMARY KEY (fileid, process_typeid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_work_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_work_queue_name ON work_queue(queue_name, id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Per-lock enable flags; a lock gates any number of queues
pub async fn create_queue_locks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_locks (
            lock_name TEXT NOT NULL,
            queue_name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (lock_name, queue_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
