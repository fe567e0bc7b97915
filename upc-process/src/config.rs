//! Run configuration
//!
//! The bootstrap TOML names three documents which are read once at startup
//! into an immutable [`UpcConfig`] and passed by reference from then on:
//! - archive registry (`{archive: {archiveid, path, bandbinQuery}}`)
//! - keyword catalog (see [`crate::keywords`])
//! - recipe directory (see [`crate::recipe`])

use crate::error::{ProcessError, ProcessResult};
use crate::keywords::KeywordCatalog;
use crate::recipe::RecipeStore;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use upc_common::config::TomlConfig;

/// One archive registry entry
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveInfo {
    #[serde(rename = "archiveid")]
    pub archive_id: i64,

    /// Archive root on the local filesystem
    #[serde(default)]
    pub path: String,

    /// BandBin keyword naming the filter/band identifiers
    #[serde(rename = "bandbinQuery", default)]
    pub bandbin_query: Option<String>,
}

/// Archive name → registry entry
#[derive(Debug, Clone, Default)]
pub struct ArchiveRegistry {
    archives: HashMap<String, ArchiveInfo>,
}

impl ArchiveRegistry {
    pub fn from_json_str(json: &str) -> ProcessResult<Self> {
        let archives: HashMap<String, ArchiveInfo> = serde_json::from_str(json)?;
        Ok(Self { archives })
    }

    pub fn load(path: &Path) -> ProcessResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProcessError::Common(upc_common::Error::Config(format!(
                "Read archive registry {} failed: {}",
                path.display(),
                e
            )))
        })?;
        let registry = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            archives = registry.archives.len(),
            "Archive registry loaded"
        );
        Ok(registry)
    }

    pub fn get(&self, archive: &str) -> Option<&ArchiveInfo> {
        self.archives.get(archive)
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}

/// Immutable configuration for one worker run
#[derive(Debug, Clone)]
pub struct UpcConfig {
    pub bootstrap: TomlConfig,
    pub registry: ArchiveRegistry,
    pub catalog: KeywordCatalog,
    pub recipes: RecipeStore,
}

impl UpcConfig {
    /// Read every document named by the bootstrap file
    ///
    /// The keyword catalog is joined with the `keywords` table of the UPC
    /// database, so that database must already be initialized.
    pub async fn load(bootstrap: TomlConfig, upc_db: &SqlitePool) -> ProcessResult<Self> {
        let registry = ArchiveRegistry::load(&bootstrap.archive_registry)?;
        let catalog = KeywordCatalog::load(&bootstrap.keyword_catalog, upc_db).await?;
        let recipes = RecipeStore::load_dir(&bootstrap.recipe_dir)?;

        Ok(Self {
            bootstrap,
            registry,
            catalog,
            recipes,
        })
    }
}
