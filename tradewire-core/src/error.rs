//! Error types for tradewire core operations

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or TRADEWIRE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Durable storage errors.
///
/// These never invalidate the in-memory session; the credential store logs
/// and counts them instead of propagating.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Durable store I/O failed for {key}: {reason}")]
    Io { key: String, reason: String },

    #[error("Durable store contents could not be decoded: {reason}")]
    Corrupt { reason: String },

    #[error("Durable store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StorageError {
    pub fn io(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            key: key.into(),
            reason: err.to_string(),
        }
    }
}

/// Telemetry initialisation errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Global tracing subscriber already installed")]
    AlreadyInstalled,
}

/// Master error type for tradewire core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
