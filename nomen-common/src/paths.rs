//! Data and bundle path resolution.
//!
//! Resolution priority for the data directory:
//! 1. `NOMEN_DATA_DIR` environment variable
//! 2. OS config directory (`~/.config/nomen`, `%APPDATA%\nomen`, ...)
//! 3. `./data` relative to the working directory (dev fallback)

use crate::Result;
use std::path::{Path, PathBuf};

const ENV_DATA_DIR: &str = "NOMEN_DATA_DIR";

/// Resolved filesystem locations for one running core.
#[derive(Debug, Clone)]
pub struct DataPaths {
    data_dir: PathBuf,
}

impl DataPaths {
    /// Resolve the data directory and create it (plus the cache subdir).
    pub fn resolve() -> Result<Self> {
        let data_dir = if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            PathBuf::from(dir)
        } else if let Some(config) = dirs::config_dir() {
            config.join("nomen")
        } else {
            PathBuf::from("data")
        };
        Self::at(data_dir)
    }

    /// Use an explicit data directory (tests, embedded hosts).
    pub fn at(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(data_dir.join("cache"))?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("nomen.db")
    }

    /// Settings JSON document.
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    /// Cache directory (analysis artifacts, embeddings).
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Primary UCS taxonomy sheet (full list).
    pub fn ucs_full_list(&self) -> PathBuf {
        self.data_dir.join("ucs").join("ucs_full_list.csv")
    }

    /// Secondary UCS taxonomy sheet (category overview).
    pub fn ucs_category_overview(&self) -> PathBuf {
        self.data_dir.join("ucs").join("ucs_category_overview.csv")
    }
}
