// ⚙️ Configuration
// Layered: built-in defaults → optional JSON file → environment → CLI flags.

use crate::error::{Error, Result};
use crate::parser::DEFAULT_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV: &str = "PAYROLL_CONFIG";
pub const DATABASE_ENV: &str = "PAYROLL_DB";
pub const SERVER_ADDR_ENV: &str = "PAYROLL_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Entries per numeric cache in each parser
    pub cache_capacity: usize,

    /// Default hours threshold for outlier listings
    pub outlier_threshold_hours: f64,

    /// Where report exports are written
    pub export_dir: PathBuf,

    /// Bind address for the API server
    pub server_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("payroll.db"),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            outlier_threshold_hours: 40.0,
            export_dir: PathBuf::from("reports"),
            server_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    /// Read a JSON config file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "cannot read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Defaults, then `explicit_file` (or $PAYROLL_CONFIG), then env overrides
    pub fn load(explicit_file: Option<&Path>) -> Result<Self> {
        let file = explicit_file
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Config::from_file(&path)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests)
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup(DATABASE_ENV) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup(SERVER_ADDR_ENV) {
            self.server_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::config("cache_capacity must be at least 1"));
        }
        if !self.outlier_threshold_hours.is_finite() || self.outlier_threshold_hours < 0.0 {
            return Err(Error::config(
                "outlier_threshold_hours must be a non-negative number",
            ));
        }
        if self.server_addr.trim().is_empty() {
            return Err(Error::config("server_addr must not be empty"));
        }
        Ok(())
    }
}
