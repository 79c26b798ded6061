//! `google.rpc` mirrors and structured-error extraction.
//!
//! The permissions service attaches machine-readable details to failed RPCs
//! as a serialized `google.rpc.Status` in the `grpc-status-details-bin`
//! trailer. The first `ErrorInfo` detail carries the `reason` callers branch
//! on (for example `CYCLE_DETECTED` or `MAXIMUM_DEPTH_EXCEEDED`).

use std::collections::HashMap;

use prost::Message;

/// The `google.rpc.Status` message carried in error trailers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    /// Canonical status code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Developer-facing error message.
    #[prost(string, tag = "2")]
    pub message: String,
    /// Machine-readable detail payloads.
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<::prost_types::Any>,
}

/// The `google.rpc.ErrorInfo` detail message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorInfo {
    /// Stable error reason constant, e.g. `CYCLE_DETECTED`.
    #[prost(string, tag = "1")]
    pub reason: String,
    /// Service domain that produced the error.
    #[prost(string, tag = "2")]
    pub domain: String,
    /// Additional structured context, e.g. an embedded debug trace.
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
}

/// Suffix of the `Any.type_url` identifying an [`ErrorInfo`] payload.
const ERROR_INFO_TYPE_URL_SUFFIX: &str = "google.rpc.ErrorInfo";

/// Extracts the first [`ErrorInfo`] detail from a failed RPC status.
///
/// Returns `None` when the status carries no details, no `ErrorInfo`-typed
/// detail, or a detail payload that does not decode.
#[must_use]
pub fn error_info_from_status(status: &tonic::Status) -> Option<ErrorInfo> {
    let details = status.details();
    if details.is_empty() {
        return None;
    }
    let status = Status::decode(details).ok()?;
    status
        .details
        .iter()
        .find(|any| any.type_url.ends_with(ERROR_INFO_TYPE_URL_SUFFIX))
        .and_then(|any| ErrorInfo::decode(any.value.as_slice()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with_error_info(reason: &str) -> tonic::Status {
        let info = ErrorInfo {
            reason: reason.to_owned(),
            domain: "authzed.com".to_owned(),
            metadata: HashMap::new(),
        };
        let any = ::prost_types::Any {
            type_url: "type.googleapis.com/google.rpc.ErrorInfo".to_owned(),
            value: info.encode_to_vec(),
        };
        let rpc_status = Status {
            code: tonic::Code::FailedPrecondition as i32,
            message: "cycle".to_owned(),
            details: vec![any],
        };
        tonic::Status::with_details(
            tonic::Code::FailedPrecondition,
            "cycle",
            rpc_status.encode_to_vec().into(),
        )
    }

    #[test]
    fn extracts_first_error_info() {
        let status = status_with_error_info("CYCLE_DETECTED");
        let info = error_info_from_status(&status).unwrap();
        assert_eq!(info.reason, "CYCLE_DETECTED");
        assert_eq!(info.domain, "authzed.com");
    }

    #[test]
    fn plain_status_has_no_error_info() {
        let status = tonic::Status::unavailable("backend down");
        assert!(error_info_from_status(&status).is_none());
    }

    #[test]
    fn non_error_info_details_are_skipped() {
        let any = ::prost_types::Any {
            type_url: "type.googleapis.com/google.rpc.RetryInfo".to_owned(),
            value: Vec::new(),
        };
        let rpc_status = Status {
            code: tonic::Code::Aborted as i32,
            message: "retry".to_owned(),
            details: vec![any],
        };
        let status = tonic::Status::with_details(
            tonic::Code::Aborted,
            "retry",
            rpc_status.encode_to_vec().into(),
        );
        assert!(error_info_from_status(&status).is_none());
    }
}
