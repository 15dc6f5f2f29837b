//! Core error types for SBSP

use thiserror::Error;

/// Main error type for SBSP operations
#[derive(Error, Debug)]
pub enum SbspError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Parsing error: {0}")]
    Parse(String),

    /// Malformed bundle or output template
    #[error("Partition error: {0}")]
    Partition(String),

    /// The execution mechanism rejected a chunk or item
    #[error("Submission error: {0}")]
    Submission(String),

    /// A per-item mapping (e.g. ancestor to target database) could not be resolved
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias for SBSP operations
pub type SbspResult<T> = Result<T, SbspError>;

impl From<serde_json::Error> for SbspError {
    fn from(err: serde_json::Error) -> Self {
        SbspError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for SbspError {
    fn from(err: csv::Error) -> Self {
        SbspError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SbspError {
    fn from(err: toml::de::Error) -> Self {
        SbspError::Configuration(format!("Failed to parse config: {}", err))
    }
}

impl From<anyhow::Error> for SbspError {
    fn from(err: anyhow::Error) -> Self {
        SbspError::Other(format!("{:#}", err))
    }
}
