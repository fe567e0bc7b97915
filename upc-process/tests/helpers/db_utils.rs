//! Database and configuration fixtures
//!
//! A [`TestEnv`] owns a temporary directory with both SQLite databases, the
//! configuration documents and an archive directory for source files.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use upc_common::config::TomlConfig;
use upc_process::executor::StepExecutor;
use upc_process::queue::{QueueLock, SqliteQueueLock, SqliteWorkQueue, WorkQueue};
use upc_process::services::Persistence;
use upc_process::{QueueConsumer, UpcConfig, WorkItem};

pub const QUEUE: &str = "UPC_ReadyQueue";
pub const LOCK: &str = "processing";
pub const ARCHIVE_URL: &str = "https://pds.example/Missions/";

const CATALOG: &str = r#"{
    "instrument": {
        "COMMON": {
            "targetname": {"type": "string", "keyword": "TargetName"},
            "starttime": {"type": "time", "keyword": "StartTime"},
            "pixelresolution": {"type": "double", "keyword": "PixelResolution"}
        },
        "mro": {
            "spacecraftclock": {"type": "string", "keyword": "SpacecraftClockCount"},
            "lines": {"type": "integer", "keyword": "Lines"}
        },
        "themis": {
            "lines": {"type": "integer", "keyword": "Lines"}
        }
    }
}"#;

const REGISTRY: &str = r#"{
    "mro": {"archiveid": 16, "path": "/pds_san/PDS_Archive/MRO/", "bandbinQuery": "FilterName"},
    "themis": {"archiveid": 53, "path": "/pds_san/PDS_Archive/Mars_Odyssey/", "bandbinQuery": "FilterName"},
    "norecipe": {"archiveid": 99, "path": "/pds_san/PDS_Archive/None/", "bandbinQuery": "FilterName"}
}"#;

/// Keyword type rows: (typeid, typename, instrumentid)
const KEYWORDS: &[(i64, &str, i64)] = &[
    (1, "processdate", 1),
    (2, "errortype", 1),
    (3, "errormessage", 1),
    (4, "error", 1),
    (5, "isisfootprint", 1),
    (6, "isiscentroid", 1),
    (7, "starttime", 1),
    (8, "stoptime", 1),
    (9, "checksum", 1),
    (10, "targetname", 1),
    (11, "pixelresolution", 1),
    (40, "spacecraftclock", 16),
    (41, "lines", 16),
];

pub struct TestEnv {
    pub dir: TempDir,
    pub upc: SqlitePool,
    pub pds: SqlitePool,
    pub config: Arc<UpcConfig>,
    pub archive_dir: PathBuf,
}

/// Temp databases seeded with reference rows, plus config documents
///
/// `mro` runs `mro_steps`; `themis` runs thmproc → handmos → spiceinit → caminfo.
pub async fn create_test_env(mro_steps: &[&str]) -> Result<TestEnv> {
    let dir = TempDir::new()?;
    let root = dir.path();

    let upc = upc_common::db::init_upc_database(&root.join("upc.db")).await?;
    let pds = upc_common::db::init_pds_database(&root.join("pds.db")).await?;
    seed_reference_data(&upc).await?;

    std::fs::write(root.join("UPCkeywords.json"), CATALOG)?;
    std::fs::write(root.join("PDSinfo.json"), REGISTRY)?;

    let recipe_dir = root.join("recipes");
    std::fs::create_dir_all(&recipe_dir)?;
    std::fs::write(recipe_dir.join("mro.json"), recipe_json(mro_steps))?;
    std::fs::write(
        recipe_dir.join("themis.json"),
        recipe_json(&["thmproc", "handmos", "spiceinit", "caminfo"]),
    )?;

    let archive_dir = root.join("archive");
    std::fs::create_dir_all(&archive_dir)?;

    let bootstrap = TomlConfig {
        upc_database: root.join("upc.db"),
        pds_database: root.join("pds.db"),
        workarea: root.join("workarea"),
        archive_registry: root.join("PDSinfo.json"),
        keyword_catalog: root.join("UPCkeywords.json"),
        recipe_dir,
        archive_root: format!("{}/", archive_dir.display()),
        archive_url: ARCHIVE_URL.to_string(),
        ..TomlConfig::default()
    };
    std::fs::create_dir_all(&bootstrap.workarea)?;

    let config = UpcConfig::load(bootstrap, &upc).await?;

    Ok(TestEnv {
        dir,
        upc,
        pds,
        config: Arc::new(config),
        archive_dir,
    })
}

fn recipe_json(steps: &[&str]) -> String {
    let entries: Vec<String> = steps.iter().map(|s| format!("\"{}\": {{}}", s)).collect();
    format!("{{\"upc\": {{\"recipe\": {{{}}}}}}}", entries.join(", "))
}

async fn seed_reference_data(pool: &SqlitePool) -> Result<()> {
    sqlx::query("INSERT INTO targets (targetid, naifid, targetname) VALUES (1, 499, 'MARS')")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO instruments (instrumentid, instrument) VALUES (1, 'COMMON'), (16, 'CTX')")
        .execute(pool)
        .await?;
    for (typeid, typename, instrumentid) in KEYWORDS {
        sqlx::query("INSERT INTO keywords (typeid, typename, instrumentid) VALUES (?, ?, ?)")
            .bind(typeid)
            .bind(typename)
            .bind(instrumentid)
            .execute(pool)
            .await?;
    }
    Ok(())
}

impl TestEnv {
    /// Write a source product into the archive directory
    pub fn write_source(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.archive_dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn workarea(&self) -> &Path {
        &self.config.bootstrap.workarea
    }

    pub fn source_url(&self, name: &str) -> String {
        format!("{}{}", ARCHIVE_URL, name)
    }

    pub fn queue(&self) -> SqliteWorkQueue {
        SqliteWorkQueue::new(self.pds.clone())
    }

    pub fn lock(&self) -> SqliteQueueLock {
        SqliteQueueLock::new(self.pds.clone(), LOCK)
    }

    pub async fn enqueue(&self, item: &WorkItem) {
        self.queue()
            .push(QUEUE, &item.to_payload().unwrap())
            .await
            .unwrap();
    }

    pub async fn consumer(&self, executor: Arc<dyn StepExecutor>) -> QueueConsumer {
        let lock = self.lock();
        lock.register(QUEUE).await.unwrap();
        self.consumer_with_lock(executor, Arc::new(lock))
    }

    pub fn consumer_with_lock(&self, executor: Arc<dyn StepExecutor>, lock: Arc<dyn QueueLock>) -> QueueConsumer {
        QueueConsumer::new(
            Arc::new(self.queue()),
            lock,
            executor,
            Persistence::new(self.upc.clone(), self.pds.clone()),
            self.config.clone(),
            QUEUE,
        )
    }

    /// Files left anywhere under the work area
    pub fn workarea_entries(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, out);
                }
                out.push(path);
            }
        }
        let mut out = Vec::new();
        walk(self.workarea(), &mut out);
        out
    }

    pub async fn upcid_by_isisid(&self, isisid: &str) -> Option<i64> {
        sqlx::query_scalar("SELECT upcid FROM datafiles WHERE isisid = ?")
            .bind(isisid)
            .fetch_optional(&self.upc)
            .await
            .unwrap()
    }

    pub async fn upcid_by_source(&self, url: &str) -> Option<i64> {
        sqlx::query_scalar("SELECT upcid FROM datafiles WHERE edr_source = ?")
            .bind(url)
            .fetch_optional(&self.upc)
            .await
            .unwrap()
    }

    pub async fn text_value(&self, table: &str, upcid: i64, typeid: i64) -> Option<String> {
        let sql = format!("SELECT value FROM {} WHERE upcid = ? AND typeid = ?", table);
        sqlx::query_scalar(&sql)
            .bind(upcid)
            .bind(typeid)
            .fetch_optional(&self.upc)
            .await
            .unwrap()
    }

    pub async fn error_flag(&self, upcid: i64) -> Option<bool> {
        sqlx::query_scalar("SELECT value FROM meta_booleans WHERE upcid = ? AND typeid = 4")
            .bind(upcid)
            .fetch_optional(&self.upc)
            .await
            .unwrap()
    }

    pub async fn audit_outcome(&self, file_id: i64) -> Option<bool> {
        upc_process::db::process_runs::outcome(&self.pds, file_id)
            .await
            .unwrap()
    }

    /// Row count of every table the worker writes, in a fixed order
    pub async fn row_counts(&self) -> Vec<(&'static str, i64)> {
        let mut counts = Vec::new();
        for table in [
            "datafiles",
            "meta_times",
            "meta_strings",
            "meta_booleans",
            "meta_doubles",
            "meta_integers",
            "meta_geometries",
            "meta_bands",
        ] {
            counts.push((table, count(&self.upc, table).await));
        }
        counts.push(("process_runs", count(&self.pds, "process_runs").await));
        counts
    }
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
