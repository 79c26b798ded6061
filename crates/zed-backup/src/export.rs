//! The export pipeline: server stream → rewriter → container.
//!
//! One reader task consumes the bulk-export stream and one writer task
//! applies the rewriter and writes the container; a bounded channel between
//! them propagates backpressure. The reader reconnects from the last
//! observed cursor on `Unavailable`, within the retry budget. Cancellation
//! flushes the writer, stamps the cursor slot, and surfaces
//! [`ZedError::Cancelled`] so the dispatcher exits 130.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zed_client::Backend;
use zed_core::{ZedError, ZedResult};
use zed_proto::v1::{BulkExportRelationshipsRequest, Consistency, Cursor, Relationship};

use crate::container::ContainerWriter;
use crate::rewrite::{RewriteOutcome, Rewriter};

/// Knobs for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Where the container is written.
    pub output: PathBuf,
    /// Page size requested from the bulk-export stream.
    pub page_size: u32,
    /// Reconnect budget for `Unavailable` stream failures.
    pub max_retries: u32,
    /// Interval between progress lines on a TTY stderr.
    pub progress_interval: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("backup.zed"),
            page_size: 1_000,
            max_retries: 5,
            progress_interval: Duration::from_secs(5),
        }
    }
}

/// Counters reported after (or during) an export.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    /// Relationships received from the server.
    pub processed: u64,
    /// Relationships written to the container.
    pub kept: u64,
    /// Relationships dropped by the rewriter chain.
    pub filtered: u64,
}

struct Counters {
    processed: AtomicU64,
    kept: AtomicU64,
    filtered: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ExportSummary {
        ExportSummary {
            processed: self.processed.load(Ordering::Relaxed),
            kept: self.kept.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }
}

enum WriterMessage {
    Record(Box<Relationship>, Option<String>),
}

/// Runs a full export against `backend`.
///
/// On cancellation the container is flushed and closed with the last
/// cursor stamped, then [`ZedError::Cancelled`] is returned.
pub async fn run_export(
    backend: Arc<dyn Backend>,
    rewriter: Box<dyn Rewriter>,
    options: ExportOptions,
    cancel: CancellationToken,
) -> ZedResult<ExportSummary> {
    // Resolve the change token and schema; a store without a schema cannot
    // be backed up.
    let schema_response = backend.read_schema().await.map_err(|err| match err {
        ZedError::ServerRejected { ref reason, .. } if reason == "NOT_FOUND" => {
            ZedError::Validation("the store has no schema; nothing to export".to_owned())
        }
        other => other,
    })?;
    let revision_token = schema_response
        .read_at
        .map(|t| t.token)
        .unwrap_or_default();
    let schema = rewriter.rewrite_schema(&schema_response.schema_text)?;

    let file = std::fs::File::create(&options.output)
        .map_err(|err| ZedError::Internal(format!("cannot create backup file: {err}")))?;
    let buffered = std::io::BufWriter::new(file);

    let counters = Arc::new(Counters {
        processed: AtomicU64::new(0),
        kept: AtomicU64::new(0),
        filtered: AtomicU64::new(0),
    });

    let capacity = usize::try_from(options.page_size).unwrap_or(1_000).max(1) * 2;
    let (tx, mut rx) = mpsc::channel::<WriterMessage>(capacity);

    // Writer task: rewriter + container, on a blocking thread since the
    // container does synchronous file I/O.
    let writer_counters = counters.clone();
    let writer_revision = revision_token.clone();
    let writer = tokio::task::spawn_blocking(move || -> ZedResult<()> {
        let mut container = ContainerWriter::create(buffered, &schema, &writer_revision, true)?;
        while let Some(WriterMessage::Record(rel, cursor)) = rx.blocking_recv() {
            match rewriter.rewrite_relationship(*rel)? {
                RewriteOutcome::Kept(rel) => {
                    container.append(&rel, cursor.as_deref())?;
                    writer_counters.kept.fetch_add(1, Ordering::Relaxed);
                }
                RewriteOutcome::Dropped => {
                    writer_counters.filtered.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        let inner = container.close()?;
        inner
            .into_inner()
            .map_err(|err| ZedError::Internal(format!("flush failed: {err}")))?
            .sync_all()
            .map_err(|err| ZedError::Internal(format!("fsync failed: {err}")))?;
        Ok(())
    });

    // Reader loop with reconnection.
    let read_result = read_stream(
        backend.as_ref(),
        &revision_token,
        &options,
        &counters,
        &tx,
        &cancel,
    )
    .await;

    // Closing the channel is the writer's shutdown signal; close ordering
    // is stream → channel → container.
    drop(tx);
    writer
        .await
        .map_err(|err| ZedError::Internal(format!("writer task panicked: {err}")))??;

    let summary = counters.snapshot();
    match read_result {
        Ok(()) => {
            info!(
                processed = summary.processed,
                kept = summary.kept,
                filtered = summary.filtered,
                "export complete"
            );
            Ok(summary)
        }
        Err(err) => {
            warn!(
                processed = summary.processed,
                kept = summary.kept,
                "export stopped early; the container holds the resume cursor"
            );
            Err(err)
        }
    }
}

async fn read_stream(
    backend: &dyn Backend,
    revision_token: &str,
    options: &ExportOptions,
    counters: &Arc<Counters>,
    tx: &mpsc::Sender<WriterMessage>,
    cancel: &CancellationToken,
) -> ZedResult<()> {
    let mut cursor: Option<String> = None;
    let mut reconnects: u32 = 0;
    let mut progress = tokio::time::interval(options.progress_interval);
    progress.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let show_progress = std::io::stderr().is_terminal();

    'connect: loop {
        let request = BulkExportRelationshipsRequest {
            consistency: Some(if revision_token.is_empty() {
                Consistency::fully_consistent()
            } else {
                Consistency::at_exact_snapshot(zed_proto::v1::ZedToken {
                    token: revision_token.to_owned(),
                })
            }),
            optional_limit: options.page_size,
            optional_cursor: cursor.clone().map(|token| Cursor { token }),
            optional_relationship_filter: None,
        };
        let mut stream = backend.bulk_export(request).await?;

        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => return Err(ZedError::Cancelled),
                _ = progress.tick() => {
                    if show_progress {
                        let s = counters.snapshot();
                        eprintln!(
                            "processed {} / kept {} / filtered {}",
                            s.processed, s.kept, s.filtered
                        );
                    }
                    continue;
                }
                item = stream.next() => item,
            };

            match item {
                None => return Ok(()),
                Some(Ok(batch)) => {
                    let batch_cursor = batch.after_result_cursor.map(|c| c.token);
                    let last = batch.relationships.len().saturating_sub(1);
                    for (idx, rel) in batch.relationships.into_iter().enumerate() {
                        counters.processed.fetch_add(1, Ordering::Relaxed);
                        // The cursor covers the whole batch; attach it to
                        // its final record only.
                        let record_cursor = if idx == last {
                            batch_cursor.clone()
                        } else {
                            None
                        };
                        let send = tokio::select! {
                            () = cancel.cancelled() => return Err(ZedError::Cancelled),
                            send = tx.send(WriterMessage::Record(Box::new(rel), record_cursor)) => send,
                        };
                        if send.is_err() {
                            // The writer died; its error surfaces at join.
                            return Ok(());
                        }
                    }
                    if let Some(c) = batch_cursor {
                        cursor = Some(c);
                    }
                }
                Some(Err(status)) if status.code() == tonic::Code::Unavailable => {
                    reconnects += 1;
                    if reconnects > options.max_retries {
                        return Err(ZedError::ServerUnavailable(format!(
                            "export stream failed after {reconnects} reconnects: {}",
                            status.message()
                        )));
                    }
                    debug!(
                        reconnects,
                        cursor = cursor.as_deref().unwrap_or(""),
                        "export stream dropped; reconnecting"
                    );
                    continue 'connect;
                }
                Some(Err(status)) => return Err(status.into()),
            }
        }
    }
}
