//! Per-method retry policy with jittered exponential backoff.
//!
//! The policy is an immutable table keyed by `(service, method)`:
//! idempotent reads and stream *opens* retry on transient statuses; unary
//! writes retry only when the server marks an `Aborted` as retryable; once a
//! stream has delivered its first message, failures propagate untouched.
//! Backoff never blocks a thread; the loop sleeps on a timer and observes
//! cancellation at every boundary.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tonic::Code;
use tracing::debug;
use zed_core::{ZedError, ZedResult};
use zed_proto::error_info_from_status;

use crate::metadata::CallMetadata;

/// Per-attempt timeout for unary reads.
const READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-attempt timeout for unary writes.
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// How a method participates in retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Idempotent unary read; retries on transient statuses.
    Read,
    /// Unary write; retries only on server-advertised retryable aborts.
    Write,
    /// Stream open; the open retries like a read, delivered messages do not.
    StreamingOpen,
    /// Called exactly once, whatever happens.
    Once,
}

impl MethodKind {
    fn permits_retry(self, status: &tonic::Status) -> bool {
        match self {
            Self::Once => false,
            Self::Read | Self::StreamingOpen => matches!(
                status.code(),
                Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted
            ) || is_retryable_abort(status),
            Self::Write => is_retryable_abort(status),
        }
    }
}

/// The server marks a serialization abort as safe to retry through the
/// `retryable` key of its `ErrorInfo` detail.
fn is_retryable_abort(status: &tonic::Status) -> bool {
    status.code() == Code::Aborted
        && error_info_from_status(status)
            .is_some_and(|info| info.metadata.get("retryable").is_some_and(|v| v == "true"))
}

/// The resolved policy for one method.
#[derive(Debug, Clone)]
pub struct MethodPolicy {
    /// How this method retries.
    pub kind: MethodKind,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Deadline per attempt; `None` leaves the call unbounded (streams).
    pub per_attempt_timeout: Option<Duration>,
}

/// The immutable retry table plus backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for retryable methods, including the first.
    pub max_attempts: u32,
    /// First backoff delay.
    pub base: Duration,
    /// Backoff ceiling before jitter.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(100),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy with a caller-chosen attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Looks up `(service, method)` in the table.
    #[must_use]
    pub fn for_method(&self, service: &str, method: &str) -> MethodPolicy {
        let (kind, per_attempt_timeout) = match (service, method) {
            ("authzed.api.v1.SchemaService", "ReadSchema")
            | ("authzed.api.v1.PermissionsService", "CheckPermission")
            | ("authzed.api.v1.PermissionsService", "CheckBulkPermissions")
            | ("authzed.api.v1.PermissionsService", "ExpandPermissionTree") => {
                (MethodKind::Read, Some(READ_TIMEOUT))
            }
            ("authzed.api.v1.SchemaService", "WriteSchema")
            | ("authzed.api.v1.PermissionsService", "WriteRelationships")
            | ("authzed.api.v1.PermissionsService", "DeleteRelationships") => {
                (MethodKind::Write, Some(WRITE_TIMEOUT))
            }
            ("authzed.api.v1.PermissionsService", "LookupResources")
            | ("authzed.api.v1.PermissionsService", "LookupSubjects")
            | ("authzed.api.v1.PermissionsService", "ReadRelationships")
            | ("authzed.api.v1.WatchService", "Watch")
            | ("authzed.api.v1.ExperimentalService", "BulkExportRelationships") => {
                (MethodKind::StreamingOpen, None)
            }
            // Client-streaming: nothing is safe to replay once the first
            // message is on the wire. The import pipeline retries whole
            // batches instead.
            ("authzed.api.v1.ExperimentalService", "BulkImportRelationships") => {
                (MethodKind::Once, None)
            }
            _ => (MethodKind::Once, Some(READ_TIMEOUT)),
        };
        let max_attempts = match kind {
            MethodKind::Once => 1,
            MethodKind::Write => self.max_attempts,
            MethodKind::Read | MethodKind::StreamingOpen => self.max_attempts,
        };
        MethodPolicy {
            kind,
            max_attempts,
            per_attempt_timeout,
        }
    }

    /// `min(cap, base · 2^attempt) · uniform(0.5, 1.5)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(20)));
        let capped = exp.min(self.cap);
        capped.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
    }
}

/// Drives one logical call through the bounded retry loop.
///
/// `call` is invoked with a freshly stamped request per attempt; callers
/// close over a cheap clone of their service client.
pub(crate) async fn run<M, R, Fut>(
    policy: &RetryPolicy,
    method: &MethodPolicy,
    cancel: &CancellationToken,
    metadata: &CallMetadata,
    message: M,
    mut call: impl FnMut(tonic::Request<M>) -> Fut,
) -> ZedResult<tonic::Response<R>>
where
    M: Clone,
    Fut: Future<Output = Result<tonic::Response<R>, tonic::Status>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ZedError::Cancelled);
        }
        let mut request = tonic::Request::new(message.clone());
        metadata.apply(request.metadata_mut());
        if let Some(timeout) = method.per_attempt_timeout {
            request.set_timeout(timeout);
        }
        match call(request).await {
            Ok(response) => return Ok(response),
            Err(status) => {
                attempt = attempt.saturating_add(1);
                if attempt >= method.max_attempts || !method.kind.permits_retry(&status) {
                    return Err(status.into());
                }
                let delay = policy.backoff(attempt.saturating_sub(1));
                debug!(
                    code = %status.code(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(ZedError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn read_method(policy: &RetryPolicy) -> MethodPolicy {
        policy.for_method("authzed.api.v1.SchemaService", "ReadSchema")
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_to_success() {
        let policy = RetryPolicy::with_max_attempts(3);
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result: ZedResult<tonic::Response<u32>> = run(
            &policy,
            &read_method(&policy),
            &CancellationToken::new(),
            &CallMetadata::default(),
            (),
            move |_req| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(tonic::Status::unavailable("backend down"))
                    } else {
                        Ok(tonic::Response::new(7))
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap().into_inner(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn the_attempt_budget_is_a_hard_bound() {
        let policy = RetryPolicy::with_max_attempts(3);
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result: ZedResult<tonic::Response<u32>> = run(
            &policy,
            &read_method(&policy),
            &CancellationToken::new(),
            &CallMetadata::default(),
            (),
            move |_req| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Err(tonic::Status::unavailable("still down")) }
            },
        )
        .await;
        assert!(matches!(result, Err(ZedError::ServerUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_methods_issue_exactly_one_rpc() {
        let policy = RetryPolicy::default();
        let method = policy.for_method(
            "authzed.api.v1.ExperimentalService",
            "BulkImportRelationships",
        );
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result: ZedResult<tonic::Response<u32>> = run(
            &policy,
            &method,
            &CancellationToken::new(),
            &CallMetadata::default(),
            (),
            move |_req| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Err(tonic::Status::unavailable("down")) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn writes_do_not_retry_plain_transient_failures() {
        let policy = RetryPolicy::default();
        let method = policy.for_method("authzed.api.v1.SchemaService", "WriteSchema");
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result: ZedResult<tonic::Response<u32>> = run(
            &policy,
            &method,
            &CancellationToken::new(),
            &CallMetadata::default(),
            (),
            move |_req| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Err(tonic::Status::unavailable("down")) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_calls_never_start_an_attempt() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: ZedResult<tonic::Response<u32>> = run(
            &policy,
            &read_method(&policy),
            &cancel,
            &CallMetadata::default(),
            (),
            |_req| async move { Ok(tonic::Response::new(1)) },
        )
        .await;
        assert!(matches!(result, Err(ZedError::Cancelled)));
    }

    #[test]
    fn backoff_stays_inside_the_jittered_cap() {
        let policy = RetryPolicy::default();
        for attempt in 0..16 {
            let delay = policy.backoff(attempt);
            assert!(delay <= policy.cap.mul_f64(1.5), "attempt {attempt}");
            // The raw exponential floor is half the un-jittered delay.
            let raw = policy
                .base
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(policy.cap);
            assert!(delay >= raw.mul_f64(0.5), "attempt {attempt}");
        }
    }

    #[test]
    fn streaming_opens_share_the_read_retry_set() {
        let policy = RetryPolicy::default();
        let method = policy.for_method("authzed.api.v1.WatchService", "Watch");
        assert_eq!(method.kind, MethodKind::StreamingOpen);
        assert!(method.per_attempt_timeout.is_none());
        assert!(method
            .kind
            .permits_retry(&tonic::Status::unavailable("down")));
        assert!(!method
            .kind
            .permits_retry(&tonic::Status::permission_denied("no")));
    }
}
