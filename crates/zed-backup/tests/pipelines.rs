//! End-to-end pipeline tests against the programmable mock backend.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::Status;
use zed_backup::{
    run_export, run_import, ChainRewriter, ConflictPolicy, ContainerReader, ContainerWriter,
    ExportOptions, ImportOptions, NoopRewriter, PrefixFilter, SchemaPolicy,
};
use zed_core::{tuple, ZedError};
use zed_proto::v1::{BulkExportRelationshipsResponse, Cursor};
use zed_test::{rel, MockBackend};

const TWO_TENANT_SCHEMA: &str = "\
definition test/user {}

definition test/resource {
\trelation reader: test/user
}

definition other/user {}

definition other/resource {
\trelation reader: other/user
}";

fn export_batch(
    rels: &[&str],
    cursor: &str,
) -> Result<BulkExportRelationshipsResponse, Status> {
    Ok(BulkExportRelationshipsResponse {
        after_result_cursor: Some(Cursor {
            token: cursor.to_owned(),
        }),
        relationships: rels.iter().map(|s| rel(s)).collect(),
    })
}

fn options_for(path: &std::path::Path) -> ExportOptions {
    ExportOptions {
        output: path.to_path_buf(),
        page_size: 1_000,
        max_retries: 3,
        ..ExportOptions::default()
    }
}

#[tokio::test]
async fn export_with_a_prefix_filter_keeps_one_tenant() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");

    let backend = MockBackend::new()
        .with_schema(TWO_TENANT_SCHEMA, "rev-42")
        .with_export_session(vec![export_batch(
            &[
                "test/resource:1#reader@test/user:1",
                "other/resource:1#reader@other/user:1",
            ],
            "c1",
        )]);

    let rewriter = ChainRewriter::new().with(Box::new(PrefixFilter::new("test")));
    let summary = run_export(
        Arc::new(backend),
        Box::new(rewriter),
        options_for(&path),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.kept, 1);
    assert_eq!(summary.filtered, 1);

    let mut reader =
        ContainerReader::open(std::io::BufReader::new(std::fs::File::open(&path).unwrap()))
            .unwrap();
    assert!(reader.schema().contains("test/resource"));
    assert!(!reader.schema().contains("other/"));
    assert_eq!(reader.last_revision_token(), "rev-42");
    let only = reader.next_relationship().unwrap().unwrap();
    assert_eq!(tuple::format(&only), "test/resource:1#reader@test/user:1");
    assert!(reader.next_relationship().unwrap().is_none());
}

#[tokio::test]
async fn export_reconnects_from_the_last_cursor() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");

    let backend = MockBackend::new()
        .with_schema("definition user {}", "rev-1")
        .with_export_session(vec![
            export_batch(&["doc:1#viewer@user:1"], "c1"),
            Err(Status::unavailable("stream reset")),
        ])
        .with_export_session(vec![export_batch(&["doc:2#viewer@user:2"], "c2")]);
    let requests = backend.export_requests.clone();

    let summary = run_export(
        Arc::new(backend),
        Box::new(NoopRewriter),
        options_for(&path),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(summary.kept, 2);

    // The reconnect resumed from the cursor of the delivered batch.
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].optional_cursor.is_none());
    assert_eq!(
        requests[1].optional_cursor.as_ref().map(|c| c.token.as_str()),
        Some("c1")
    );

    // The stamped resume cursor is the last one observed.
    let reader =
        ContainerReader::open(std::io::BufReader::new(std::fs::File::open(&path).unwrap()))
            .unwrap();
    assert_eq!(reader.export_cursor().as_deref(), Some("c2"));
}

#[tokio::test]
async fn export_without_a_schema_fails_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(); // read_schema defaults to NotFound
    let err = run_export(
        Arc::new(backend),
        Box::new(NoopRewriter),
        options_for(&tmp.path().join("backup.zed")),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZedError::Validation(_)));
}

fn write_container(path: &std::path::Path, schema: &str, rels: &[&str]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer =
        ContainerWriter::create(std::io::BufWriter::new(file), schema, "rev-7", false).unwrap();
    for r in rels {
        writer.append(&rel(r), None).unwrap();
    }
    writer.close().unwrap();
}

#[tokio::test]
async fn import_writes_schema_and_relationships() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(
        &path,
        "definition user {}",
        &["doc:1#viewer@user:1", "doc:2#viewer@user:2"],
    );

    let backend = MockBackend::new(); // target store is empty
    let schemas = backend.written_schemas.clone();
    let batches = backend.imported_batches.clone();

    let summary = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.loaded, 2);
    assert_eq!(summary.watermark, 2);
    assert_eq!(schemas.lock().unwrap().as_slice(), ["definition user {}"]);
    assert_eq!(batches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn import_touch_policy_resolves_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(
        &path,
        "definition user {}",
        &[
            "doc:1#viewer@user:1",
            "doc:2#viewer@user:2",
            "doc:3#viewer@user:3",
        ],
    );

    // The store is pre-populated: the first bulk call conflicts, the
    // bisected singleton still conflicts and is touched, the remainder
    // loads.
    let backend = MockBackend::new()
        .with_import_result(Err(Status::already_exists("duplicate")))
        .with_import_result(Err(Status::already_exists("duplicate")));
    let touches = backend.written_relationships.clone();

    let summary = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            conflict_policy: ConflictPolicy::Touch,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Every input relationship was written one way or the other, and the
    // watermark covers the whole container.
    assert_eq!(summary.touched, 1);
    assert_eq!(summary.loaded, 2);
    assert_eq!(summary.watermark, 3);
    assert_eq!(touches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn import_rejects_an_existing_schema_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(&path, "definition user {}", &[]);

    let backend = MockBackend::new().with_schema("definition user {}", "head");
    let err = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZedError::Conflict(_)));
}

#[tokio::test]
async fn import_skip_if_exists_keeps_the_target_schema() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(&path, "definition user {}", &["doc:1#viewer@user:1"]);

    let backend = MockBackend::new().with_schema("definition user {}", "head");
    let schemas = backend.written_schemas.clone();

    let summary = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            schema_policy: SchemaPolicy::SkipIfExists,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(schemas.lock().unwrap().is_empty());
    assert_eq!(summary.loaded, 1);
}

#[tokio::test]
async fn import_retries_transient_batch_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(&path, "definition user {}", &["doc:1#viewer@user:1"]);

    let backend = MockBackend::new()
        .with_import_result(Err(Status::unavailable("hiccup")))
        .with_import_result(Err(Status::unavailable("hiccup")));
    let batches = backend.imported_batches.clone();

    let summary = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            max_retries: 3,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.loaded, 1);
    assert_eq!(batches.lock().unwrap().len(), 3);
}

/// An `Aborted` carrying the server's retryable `ErrorInfo` marker.
fn retryable_abort() -> Status {
    use prost::Message;
    let info = zed_proto::rpc::ErrorInfo {
        reason: "SERIALIZATION_FAILURE".to_owned(),
        domain: "authzed.com".to_owned(),
        metadata: std::collections::HashMap::from([(
            "retryable".to_owned(),
            "true".to_owned(),
        )]),
    };
    let any = prost_types::Any {
        type_url: "type.googleapis.com/google.rpc.ErrorInfo".to_owned(),
        value: info.encode_to_vec(),
    };
    let rpc_status = zed_proto::rpc::Status {
        code: tonic::Code::Aborted as i32,
        message: "serialization failure".to_owned(),
        details: vec![any],
    };
    Status::with_details(
        tonic::Code::Aborted,
        "serialization failure",
        rpc_status.encode_to_vec().into(),
    )
}

#[tokio::test]
async fn import_retries_server_backpressure() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(&path, "definition user {}", &["doc:1#viewer@user:1"]);

    let backend = MockBackend::new()
        .with_import_result(Err(Status::resource_exhausted("write pressure")));
    let batches = backend.imported_batches.clone();

    let summary = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            max_retries: 3,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.loaded, 1);
    assert_eq!(batches.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn import_retries_server_advertised_retryable_aborts() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("backup.zed");
    write_container(&path, "definition user {}", &["doc:1#viewer@user:1"]);

    let backend = MockBackend::new().with_import_result(Err(retryable_abort()));
    let batches = backend.imported_batches.clone();

    let summary = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path,
            max_retries: 3,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.loaded, 1);
    assert_eq!(batches.lock().unwrap().len(), 2);

    // A plain abort with no retryable marker stays fatal.
    let tmp2 = tempfile::tempdir().unwrap();
    let path2 = tmp2.path().join("backup.zed");
    write_container(&path2, "definition user {}", &["doc:1#viewer@user:1"]);
    let backend = MockBackend::new().with_import_result(Err(Status::aborted("no marker")));
    let err = run_import(
        Arc::new(backend),
        Box::new(NoopRewriter),
        ImportOptions {
            input: path2,
            max_retries: 3,
            ..ImportOptions::default()
        },
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZedError::ServerRejected { .. }));
}
