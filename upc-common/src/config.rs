//! Bootstrap configuration loading
//!
//! Resolution order for the bootstrap TOML file:
//! 1. Explicit path (command-line argument or `UPC_CONFIG`)
//! 2. User config file (`~/.config/upc/upc.toml` on Linux)
//! 3. System config file (`/etc/upc/upc.toml`)
//! 4. Compiled defaults (missing file is a warning, not an error)
//!
//! Only bootstrap concerns live here. The archive registry, keyword catalog and
//! recipes are separate documents whose paths are named by this file.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the bootstrap file
pub const CONFIG_ENV_VAR: &str = "UPC_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// SQLite database holding datafiles, typed metadata and reference tables
    pub upc_database: PathBuf,

    /// SQLite database holding process runs, work queues and queue locks
    pub pds_database: PathBuf,

    /// Root of the shared working area; each item gets its own subdirectory
    pub workarea: PathBuf,

    /// Archive registry document (JSON)
    pub archive_registry: PathBuf,

    /// Keyword catalog document (JSON)
    pub keyword_catalog: PathBuf,

    /// Directory holding one recipe document per archive (`<archive>.json`)
    pub recipe_dir: PathBuf,

    /// Local archive prefix replaced when building canonical source URLs
    pub archive_root: String,

    /// Public URL prefix substituted for `archive_root`
    pub archive_url: String,

    /// Directory holding the toolkit programs (PATH lookup when unset)
    pub isis_bin: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_root: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_root = dirs::data_local_dir()
            .map(|d| d.join("upc"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/upc"));
        Self { data_root }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        let root = CompiledDefaults::for_current_platform().data_root;
        Self {
            upc_database: root.join("upc.db"),
            pds_database: root.join("pds.db"),
            workarea: root.join("workarea"),
            archive_registry: root.join("PDSinfo.json"),
            keyword_catalog: root.join("UPCkeywords.json"),
            recipe_dir: root.join("recipes"),
            archive_root: "/pds_san/PDS_Archive/".to_string(),
            archive_url: "https://pdsimage.wr.ugs.gov/Missions/".to_string(),
            isis_bin: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Load bootstrap configuration following the resolution order above
    ///
    /// An explicit path that does not exist is an error; a missing implicit
    /// file falls back to compiled defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        match default_config_file() {
            Some(path) => Self::from_file(&path),
            None => {
                warn!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a bootstrap file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Canonical public URL for a local archive path
    pub fn source_url(&self, source_path: &str) -> String {
        source_path.replacen(&self.archive_root, &self.archive_url, 1)
    }
}

/// First existing platform config file, if any
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("upc").join("upc.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/upc/upc.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
