//! The import pipeline: container → rewriter → bulk import.
//!
//! One decoder task reads batches out of the container; up to
//! `concurrency` sender tasks push them through the bulk-import endpoint.
//! Whole batches retry on transient failures; a batch that hits existing
//! relationships splits in halves until the conflicting record is
//! isolated and resolved by the conflict policy. The commit watermark
//! (the highest decoder offset acknowledged *in order*) is reported on
//! success and on every fatal error so the operator can resume.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use zed_client::retry::RetryPolicy;
use zed_client::Backend;
use zed_core::{ZedError, ZedResult};
use zed_proto::v1::relationship_update::Operation;
use zed_proto::v1::{Relationship, RelationshipUpdate, WriteRelationshipsRequest};

use crate::container::{ContainerReader, RewriteReader};
use crate::rewrite::Rewriter;

/// What to do when the target store already has a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Fail the restore.
    Reject,
    /// Write the backup's schema unconditionally.
    Overwrite,
    /// Keep the existing schema and continue with relationships.
    SkipIfExists,
}

impl std::str::FromStr for SchemaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            "skip-if-exists" => Ok(Self::SkipIfExists),
            other => Err(format!(
                "unknown schema policy \"{other}\" (reject, overwrite, skip-if-exists)"
            )),
        }
    }
}

/// What to do with a single relationship that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail the restore.
    Fail,
    /// Upsert it with a touch write.
    Touch,
    /// Leave the stored one alone.
    Skip,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(Self::Fail),
            "touch" => Ok(Self::Touch),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown conflict policy \"{other}\" (fail, touch, skip)"
            )),
        }
    }
}

/// Knobs for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// The container to restore from.
    pub input: PathBuf,
    /// Relationships per bulk-import call.
    pub batch_size: usize,
    /// Concurrent in-flight batches.
    pub concurrency: usize,
    /// Retry budget per batch for transient failures.
    pub max_retries: u32,
    /// Schema conflict handling.
    pub schema_policy: SchemaPolicy,
    /// Relationship conflict handling.
    pub conflict_policy: ConflictPolicy,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::from("backup.zed"),
            batch_size: 1_000,
            concurrency: 4,
            max_retries: 5,
            schema_policy: SchemaPolicy::Reject,
            conflict_policy: ConflictPolicy::Fail,
        }
    }
}

/// Counters reported after an import.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Relationships acknowledged by bulk import.
    pub loaded: u64,
    /// Relationships upserted through the touch fallback.
    pub touched: u64,
    /// Conflicting relationships left alone.
    pub skipped: u64,
    /// Highest decoder offset acknowledged in order.
    pub watermark: u64,
}

/// In-order commit tracking: acknowledgements arrive out of order from the
/// sender tasks, the watermark only ever moves forward contiguously.
#[derive(Default)]
struct Watermark {
    state: Mutex<WatermarkState>,
}

#[derive(Default)]
struct WatermarkState {
    next_expected: u64,
    completed: BTreeMap<u64, u64>,
}

impl Watermark {
    fn ack(&self, start: u64, end: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.completed.insert(start, end);
            loop {
                let key = state.next_expected;
                match state.completed.remove(&key) {
                    Some(end) => state.next_expected = end,
                    None => break,
                }
            }
        }
    }

    fn get(&self) -> u64 {
        self.state.lock().map(|s| s.next_expected).unwrap_or(0)
    }
}

struct Batch {
    start: u64,
    relationships: Vec<Relationship>,
}

struct Totals {
    loaded: AtomicU64,
    touched: AtomicU64,
    skipped: AtomicU64,
}

/// Restores a container into the store behind `backend`.
pub async fn run_import(
    backend: Arc<dyn Backend>,
    rewriter: Box<dyn Rewriter>,
    options: ImportOptions,
    cancel: CancellationToken,
) -> ZedResult<ImportSummary> {
    let file = std::fs::File::open(&options.input)
        .map_err(|err| ZedError::Validation(format!("cannot open backup file: {err}")))?;
    let reader = ContainerReader::open(std::io::BufReader::new(file))?;
    let mut reader = RewriteReader::new(reader, rewriter)?;
    debug!(
        revision = %reader.last_revision_token(),
        "opened backup container"
    );

    apply_schema_policy(backend.as_ref(), reader.schema(), options.schema_policy).await?;

    let watermark = Arc::new(Watermark::default());
    let totals = Arc::new(Totals {
        loaded: AtomicU64::new(0),
        touched: AtomicU64::new(0),
        skipped: AtomicU64::new(0),
    });

    // Backpressure: the decoder refills only while fewer than `concurrency`
    // batches are in flight.
    let (tx, rx) = mpsc::channel::<Batch>(options.concurrency.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let decoder_cancel = cancel.clone();
    let batch_size = options.batch_size.max(1);
    let decoder = tokio::task::spawn_blocking(move || -> ZedResult<()> {
        let mut offset: u64 = 0;
        loop {
            if decoder_cancel.is_cancelled() {
                return Err(ZedError::Cancelled);
            }
            let mut relationships = Vec::with_capacity(batch_size);
            while relationships.len() < batch_size {
                match reader.next_relationship()? {
                    Some(rel) => relationships.push(rel),
                    None => break,
                }
            }
            if relationships.is_empty() {
                return Ok(());
            }
            let len = relationships.len() as u64;
            let batch = Batch {
                start: offset,
                relationships,
            };
            offset += len;
            if tx.blocking_send(batch).is_err() {
                // All senders are gone; their error wins.
                return Ok(());
            }
        }
    });

    let retry = RetryPolicy::with_max_attempts(options.max_retries.max(1));
    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..options.concurrency.max(1) {
        let rx = rx.clone();
        let backend = backend.clone();
        let watermark = watermark.clone();
        let totals = totals.clone();
        let retry = retry.clone();
        let cancel = cancel.clone();
        let conflict_policy = options.conflict_policy;
        workers.spawn(async move {
            loop {
                let batch = {
                    let mut guard = rx.lock().await;
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ZedError::Cancelled),
                        batch = guard.recv() => batch,
                    }
                };
                let Some(batch) = batch else {
                    return Ok(());
                };
                let end = batch.start + batch.relationships.len() as u64;
                send_batch(
                    backend.as_ref(),
                    batch.relationships,
                    &retry,
                    conflict_policy,
                    &totals,
                    &cancel,
                )
                .await?;
                watermark.ack(batch.start, end);
            }
        });
    }

    let mut failure: Option<ZedError> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if failure.is_none() {
                    failure = Some(err);
                    // Stop the decoder and the remaining senders.
                    cancel.cancel();
                }
            }
            Err(err) => {
                if failure.is_none() {
                    failure = Some(ZedError::Internal(format!("sender task panicked: {err}")));
                    cancel.cancel();
                }
            }
        }
    }

    match decoder
        .await
        .map_err(|err| ZedError::Internal(format!("decoder task panicked: {err}")))?
    {
        Ok(()) => {}
        Err(ZedError::Cancelled) if failure.is_some() => {}
        Err(err) => {
            if failure.is_none() {
                failure = Some(err);
            }
        }
    }

    let summary = ImportSummary {
        loaded: totals.loaded.load(Ordering::Relaxed),
        touched: totals.touched.load(Ordering::Relaxed),
        skipped: totals.skipped.load(Ordering::Relaxed),
        watermark: watermark.get(),
    };

    if let Some(err) = failure {
        error!(
            watermark = summary.watermark,
            "import failed; resume from the reported watermark"
        );
        return Err(err);
    }
    info!(
        loaded = summary.loaded,
        touched = summary.touched,
        skipped = summary.skipped,
        watermark = summary.watermark,
        "import complete"
    );
    Ok(summary)
}

async fn apply_schema_policy(
    backend: &dyn Backend,
    schema: &str,
    policy: SchemaPolicy,
) -> ZedResult<()> {
    let existing = match backend.read_schema().await {
        Ok(_) => true,
        Err(ZedError::ServerRejected { ref reason, .. }) if reason == "NOT_FOUND" => false,
        Err(err) => return Err(err),
    };
    match (policy, existing) {
        (SchemaPolicy::Reject, true) => Err(ZedError::Conflict(
            "the target store already has a schema (use --schema-policy to override)".to_owned(),
        )),
        (SchemaPolicy::SkipIfExists, true) => {
            debug!("schema exists; skipping schema write");
            Ok(())
        }
        _ => {
            backend.write_schema(schema.to_owned()).await?;
            Ok(())
        }
    }
}

/// Sends one batch, retrying transient failures and splitting on conflict.
async fn send_batch(
    backend: &dyn Backend,
    relationships: Vec<Relationship>,
    retry: &RetryPolicy,
    conflict_policy: ConflictPolicy,
    totals: &Totals,
    cancel: &CancellationToken,
) -> ZedResult<()> {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ZedError::Cancelled);
        }
        match backend.bulk_import(relationships.clone()).await {
            Ok(loaded) => {
                totals.loaded.fetch_add(loaded, Ordering::Relaxed);
                return Ok(());
            }
            Err(ZedError::Conflict(_)) if relationships.len() > 1 => {
                // Bisect until the conflicting record is alone.
                let mid = relationships.len() / 2;
                let (left, right) = relationships.split_at(mid);
                Box::pin(send_batch(
                    backend,
                    left.to_vec(),
                    retry,
                    conflict_policy,
                    totals,
                    cancel,
                ))
                .await?;
                return Box::pin(send_batch(
                    backend,
                    right.to_vec(),
                    retry,
                    conflict_policy,
                    totals,
                    cancel,
                ))
                .await;
            }
            Err(ZedError::Conflict(message)) => {
                return match conflict_policy {
                    ConflictPolicy::Fail => Err(ZedError::Conflict(message)),
                    ConflictPolicy::Touch => {
                        let updates = relationships
                            .iter()
                            .map(|rel| RelationshipUpdate {
                                operation: Operation::Touch as i32,
                                relationship: Some(rel.clone()),
                            })
                            .collect();
                        backend
                            .write_relationships(WriteRelationshipsRequest {
                                updates,
                                optional_preconditions: Vec::new(),
                            })
                            .await?;
                        totals
                            .touched
                            .fetch_add(relationships.len() as u64, Ordering::Relaxed);
                        Ok(())
                    }
                    ConflictPolicy::Skip => {
                        totals
                            .skipped
                            .fetch_add(relationships.len() as u64, Ordering::Relaxed);
                        Ok(())
                    }
                };
            }
            Err(err) if is_transient_batch_failure(&err) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(err);
                }
                let delay = retry.backoff(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying batch");
                tokio::select! {
                    () = cancel.cancelled() => return Err(ZedError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// The statuses worth replaying a whole batch for: unavailability,
/// deadline overruns, server backpressure, and aborts the server marks
/// retryable through its `ErrorInfo` detail.
fn is_transient_batch_failure(err: &ZedError) -> bool {
    match err {
        ZedError::ServerUnavailable(_) | ZedError::Timeout(_) => true,
        ZedError::ServerRejected {
            reason, metadata, ..
        } => {
            reason == "RESOURCE_EXHAUSTED"
                || metadata.get("retryable").is_some_and(|v| v == "true")
        }
        _ => false,
    }
}
