//! Error taxonomy and exit-code mapping.

use thiserror::Error;
use zed_proto::error_info_from_status;

/// Result alias for fallible zed operations.
pub type ZedResult<T> = Result<T, ZedError>;

/// The error kinds surfaced by the CLI.
///
/// Every kind maps to one of the documented exit codes: 1 (generic),
/// 2 (validation), 3 (connection/TLS), 4 (server), 130 (interrupted).
#[derive(Debug, Error)]
pub enum ZedError {
    /// Bad arguments or flag combinations; surfaced with usage text.
    #[error("{0}")]
    Validation(String),

    /// No context is configured and no connection flags were given.
    #[error("no context found: configure one with `zed context set` or pass --endpoint")]
    ConfigMissing,

    /// The config file exists but cannot be parsed.
    #[error("config file is corrupt: {0}")]
    ConfigCorrupt(String),

    /// The secret backend could not be opened.
    #[error("secret store unavailable: {0}")]
    SecretUnavailable(String),

    /// Dialing the endpoint failed before any RPC was issued.
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    /// TLS negotiation or configuration failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server rejected the credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The operation was interrupted by the user.
    #[error("interrupted")]
    Cancelled,

    /// The call exceeded its deadline.
    #[error("deadline exceeded: {0}")]
    Timeout(String),

    /// The server is temporarily unreachable.
    #[error("service unavailable: {0}")]
    ServerUnavailable(String),

    /// The server rejected the request with a structured reason.
    #[error("{message}")]
    ServerRejected {
        /// Stable reason constant from the server's `ErrorInfo` detail,
        /// empty when the server attached none.
        reason: String,
        /// Developer-facing message from the status.
        message: String,
        /// Extra structured context from the `ErrorInfo` metadata
        /// (may embed a serialized debug trace for cycle errors).
        metadata: std::collections::HashMap<String, String>,
    },

    /// A backup container failed structural validation.
    #[error("malformed backup container: {0}")]
    MalformedContainer(String),

    /// A write conflicted with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZedError {
    /// The process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::ConnectFailed(_) | Self::Tls(_) => 3,
            Self::AuthRejected(_)
            | Self::Timeout(_)
            | Self::ServerUnavailable(_)
            | Self::ServerRejected { .. }
            | Self::Conflict(_) => 4,
            Self::Cancelled => 130,
            Self::ConfigMissing
            | Self::ConfigCorrupt(_)
            | Self::SecretUnavailable(_)
            | Self::MalformedContainer(_)
            | Self::Internal(_) => 1,
        }
    }

    /// The structured server reason, when one was attached.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::ServerRejected { reason, .. } if !reason.is_empty() => Some(reason),
            _ => None,
        }
    }
}

impl From<tonic::Status> for ZedError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;

        match status.code() {
            Code::Cancelled => Self::Cancelled,
            Code::DeadlineExceeded => Self::Timeout(status.message().to_owned()),
            Code::Unavailable => Self::ServerUnavailable(status.message().to_owned()),
            Code::Unauthenticated | Code::PermissionDenied => {
                Self::AuthRejected(status.message().to_owned())
            }
            Code::AlreadyExists => Self::Conflict(status.message().to_owned()),
            Code::Internal | Code::Unknown | Code::DataLoss => {
                Self::Internal(status.message().to_owned())
            }
            code => {
                let info = error_info_from_status(&status);
                Self::ServerRejected {
                    reason: info
                        .as_ref()
                        .map(|i| i.reason.clone())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| code_name(code).to_owned()),
                    message: status.message().to_owned(),
                    metadata: info.map(|i| i.metadata).unwrap_or_default(),
                }
            }
        }
    }
}

/// The canonical SCREAMING_SNAKE name of a status code, used as the
/// fallback reason when the server attached no `ErrorInfo`.
fn code_name(code: tonic::Code) -> &'static str {
    use tonic::Code;
    match code {
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::NotFound => "NOT_FOUND",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_documented_table() {
        assert_eq!(ZedError::Validation("x".into()).exit_code(), 2);
        assert_eq!(ZedError::ConnectFailed("x".into()).exit_code(), 3);
        assert_eq!(ZedError::Tls("x".into()).exit_code(), 3);
        assert_eq!(ZedError::ServerUnavailable("x".into()).exit_code(), 4);
        assert_eq!(ZedError::Cancelled.exit_code(), 130);
        assert_eq!(ZedError::ConfigMissing.exit_code(), 1);
    }

    #[test]
    fn status_codes_classify_into_kinds() {
        let err = ZedError::from(tonic::Status::unavailable("backend down"));
        assert!(matches!(err, ZedError::ServerUnavailable(_)));

        let err = ZedError::from(tonic::Status::unauthenticated("bad token"));
        assert!(matches!(err, ZedError::AuthRejected(_)));

        let err = ZedError::from(tonic::Status::deadline_exceeded("too slow"));
        assert!(matches!(err, ZedError::Timeout(_)));

        let err = ZedError::from(tonic::Status::failed_precondition("no schema"));
        assert!(matches!(err, ZedError::ServerRejected { .. }));
    }
}
