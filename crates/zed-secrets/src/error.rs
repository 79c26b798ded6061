//! Secret storage error types.

use thiserror::Error;

/// Result alias for secret-store operations.
pub type SecretResult<T> = Result<T, SecretError>;

/// Errors surfaced by the secret backends.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The backend cannot be opened at all (for the sealed-file backend,
    /// keychain access for the sealing key failed).
    #[error("secret backend unavailable: {0}")]
    Unavailable(String),

    /// Filesystem access failed.
    #[error("secret store I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Sealing or unsealing the file payload failed.
    #[error("secret store seal: {0}")]
    Seal(String),

    /// The stored payload does not parse.
    #[error("secret store corrupt: {0}")]
    Corrupt(String),
}

impl From<SecretError> for zed_core::ZedError {
    fn from(err: SecretError) -> Self {
        zed_core::ZedError::SecretUnavailable(err.to_string())
    }
}
