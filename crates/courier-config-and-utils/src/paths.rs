//! File system paths for the courier binary.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Central JSONL log written by the observability layer.
const CENTRAL_LOG_NAME: &str = "dev.jsonl";

/// Manages file system paths for the courier binary.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.courier)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.courier`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".courier"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.courier).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.courier/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the default database file path (~/.courier/courier.db).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("courier.db")
    }

    /// Get the logs directory (~/.courier/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central log file path (~/.courier/logs/dev.jsonl).
    pub fn central_log_file(&self) -> PathBuf {
        self.logs_dir().join(CENTRAL_LOG_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
