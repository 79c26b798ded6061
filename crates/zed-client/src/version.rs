//! Version handshake: one cheap RPC to prove the wire works.

use tonic::Code;
use tracing::warn;
use zed_core::{ZedError, ZedResult};
use zed_proto::v1::ReadSchemaRequest;

use crate::backend::GrpcBackend;

/// Metadata key asking the server to disclose its version.
const REQUEST_VERSION_KEY: &str = "x-request-server-version";
/// Response metadata key carrying the server version.
const SERVER_VERSION_KEY: &str = "server-version";
/// Oldest server version this CLI is known to work against.
const MIN_SUPPORTED: &str = "v1.22.0";

/// Issues one `ReadSchema` with the version-disclosure header.
///
/// A transport-level failure (`Unavailable`) is a hard error. Any other
/// status proves the server is reachable: an empty store answers
/// `NotFound`, a bad token answers `Unauthenticated` on the first real RPC.
/// A disclosed version older than [`MIN_SUPPORTED`] warns and continues.
pub(crate) async fn check(backend: &GrpcBackend) -> ZedResult<()> {
    let mut client = backend.raw_schema();
    let mut request = tonic::Request::new(ReadSchemaRequest {});
    backend.metadata().apply(request.metadata_mut());
    request.metadata_mut().insert(
        REQUEST_VERSION_KEY,
        tonic::metadata::MetadataValue::from_static("true"),
    );

    match client.read_schema(request).await {
        Ok(response) => {
            if let Some(version) = response
                .metadata()
                .get(SERVER_VERSION_KEY)
                .and_then(|v| v.to_str().ok())
            {
                if version_before(version, MIN_SUPPORTED) {
                    warn!(
                        server = version,
                        minimum = MIN_SUPPORTED,
                        "server is older than the oldest supported version; \
                         some commands may misbehave"
                    );
                }
            }
            Ok(())
        }
        Err(status) if status.code() == Code::Unavailable => Err(ZedError::ConnectFailed(
            format!("version handshake failed: {}", status.message()),
        )),
        Err(_) => Ok(()),
    }
}

/// Compares dotted `vMAJOR.MINOR.PATCH` strings; malformed input is never
/// considered older.
fn version_before(version: &str, minimum: &str) -> bool {
    fn parts(v: &str) -> Option<Vec<u64>> {
        v.trim_start_matches('v')
            .split('.')
            .map(|p| p.parse().ok())
            .collect()
    }
    match (parts(version), parts(minimum)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_is_numeric_not_lexicographic() {
        assert!(version_before("v1.9.0", "v1.22.0"));
        assert!(!version_before("v1.22.0", "v1.22.0"));
        assert!(!version_before("v2.0.0", "v1.22.0"));
    }

    #[test]
    fn malformed_versions_never_warn() {
        assert!(!version_before("dev-build", "v1.22.0"));
        assert!(!version_before("", "v1.22.0"));
    }
}
