//! Error types for Tessera operations

use crate::LevelId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Artifact not found: {artifact}")]
    NotFound { artifact: String },

    #[error("I/O failed for {artifact}: {reason}")]
    Io { artifact: String, reason: String },

    #[error("Corrupt artifact {artifact}: {reason}")]
    Corrupt { artifact: String, reason: String },

    #[error("Serialization failed for {artifact}: {reason}")]
    Serialization { artifact: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Map an I/O error, turning `NotFound` into the dedicated variant.
    pub fn from_io(artifact: impl Into<String>, err: &std::io::Error) -> Self {
        let artifact = artifact.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound { artifact }
        } else {
            StorageError::Io {
                artifact,
                reason: err.to_string(),
            }
        }
    }
}

/// Raster history errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Cannot composite histories with different resolutions: {left} vs {right}")]
    ResolutionMismatch { left: u16, right: u16 },

    #[error("History holds more than {max} live updates")]
    UpdateCapacityExceeded { max: usize },

    #[error("Invalid history resolution: {resolution}")]
    InvalidResolution { resolution: u16 },
}

/// Geometry errors. Any of these aborts the rebuild of a whole generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Malformed geometry in {context}: {reason}")]
    Malformed { context: String, reason: String },

    #[error("Level {level} referenced but not provided by the map source")]
    MissingLevel { level: LevelId },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unreadable configuration file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================
