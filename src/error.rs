// ⚠️ Error types
// Library-level failures. Bad lines inside an export are NOT errors: the parser
// turns them into SkipReason entries and keeps sweeping.

use std::path::PathBuf;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The export file itself could not be read
    #[error("Failed to read payroll export '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O failure (export targets, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller passed a filter that cannot be evaluated
    #[error("Invalid record filter: {message}")]
    InvalidFilter { message: String },

    /// Simulation parameters outside their documented ranges
    #[error("Invalid scenario: {message}")]
    InvalidScenario { message: String },

    /// Override map name other than "roles" / "exceptions"
    #[error("Unknown override map: {name}")]
    UnknownOverrideMap { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Error::InvalidFilter {
            message: message.into(),
        }
    }

    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        Error::InvalidScenario {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
