//! Config store error types.

use thiserror::Error;

/// Result alias for config-store operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by the config store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem access failed.
    #[error("config I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The config file exists but does not parse.
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ConfigError> for zed_core::ZedError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => zed_core::ZedError::Internal(e.to_string()),
            ConfigError::Parse(e) => zed_core::ZedError::ConfigCorrupt(e.to_string()),
        }
    }
}
