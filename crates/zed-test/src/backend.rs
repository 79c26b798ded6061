//! A programmable fake of the permission-service capability set.
//!
//! Responses are queued per method with builder-style `with_*` calls and
//! drained in FIFO order; requests are recorded for assertions. Sensible
//! defaults keep uninvolved methods out of the way: reads answer
//! `NotFound`, writes succeed, streams end immediately, bulk imports
//! acknowledge the whole batch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::StreamExt;
use tonic::Status;
use zed_client::{Backend, BoxedResponseStream};
use zed_core::{ZedError, ZedResult};
use zed_proto::v1::{
    BulkExportRelationshipsRequest, BulkExportRelationshipsResponse,
    CheckBulkPermissionsRequest, CheckBulkPermissionsResponse, CheckPermissionRequest,
    CheckPermissionResponse, DeleteRelationshipsRequest, DeleteRelationshipsResponse,
    ExpandPermissionTreeRequest, ExpandPermissionTreeResponse, LookupResourcesRequest,
    LookupResourcesResponse, LookupSubjectsRequest, LookupSubjectsResponse,
    ReadRelationshipsRequest, ReadRelationshipsResponse, ReadSchemaResponse, Relationship,
    WatchRequest, WatchResponse, WriteRelationshipsRequest, WriteRelationshipsResponse,
    WriteSchemaResponse, ZedToken,
};

type Queue<T> = Arc<Mutex<VecDeque<Result<T, Status>>>>;
type StreamQueue<T> = Arc<Mutex<VecDeque<Vec<Result<T, Status>>>>>;

fn queue<T>() -> Queue<T> {
    Arc::new(Mutex::new(VecDeque::new()))
}

fn stream_queue<T>() -> StreamQueue<T> {
    Arc::new(Mutex::new(VecDeque::new()))
}

fn pop<T>(queue: &Queue<T>) -> Option<Result<T, Status>> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

fn pop_stream<T>(queue: &StreamQueue<T>) -> Option<Vec<Result<T, Status>>> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

fn boxed<T: Send + 'static>(items: Vec<Result<T, Status>>) -> BoxedResponseStream<T> {
    futures::stream::iter(items).boxed()
}

/// The programmable fake backend.
#[derive(Clone, Default)]
pub struct MockBackend {
    read_schema: Queue<ReadSchemaResponse>,
    write_schema: Queue<WriteSchemaResponse>,
    check: Queue<CheckPermissionResponse>,
    check_bulk: Queue<CheckBulkPermissionsResponse>,
    expand: Queue<ExpandPermissionTreeResponse>,
    write_rels: Queue<WriteRelationshipsResponse>,
    delete_rels: Queue<DeleteRelationshipsResponse>,
    lookup_resources: StreamQueue<LookupResourcesResponse>,
    lookup_subjects: StreamQueue<LookupSubjectsResponse>,
    read_rels: StreamQueue<ReadRelationshipsResponse>,
    watch: StreamQueue<WatchResponse>,
    export: StreamQueue<BulkExportRelationshipsResponse>,
    import: Queue<u64>,

    /// Recorded `WriteSchema` texts.
    pub written_schemas: Arc<Mutex<Vec<String>>>,
    /// Recorded `WriteRelationships` requests.
    pub written_relationships: Arc<Mutex<Vec<WriteRelationshipsRequest>>>,
    /// Recorded `DeleteRelationships` requests.
    pub deleted_filters: Arc<Mutex<Vec<DeleteRelationshipsRequest>>>,
    /// Recorded bulk-import batches.
    pub imported_batches: Arc<Mutex<Vec<Vec<Relationship>>>>,
    /// Cursors observed on bulk-export opens.
    pub export_requests: Arc<Mutex<Vec<BulkExportRelationshipsRequest>>>,
}

impl MockBackend {
    /// A mock with empty queues and default behaviours.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_schema: queue(),
            write_schema: queue(),
            check: queue(),
            check_bulk: queue(),
            expand: queue(),
            write_rels: queue(),
            delete_rels: queue(),
            lookup_resources: stream_queue(),
            lookup_subjects: stream_queue(),
            read_rels: stream_queue(),
            watch: stream_queue(),
            export: stream_queue(),
            import: queue(),
            written_schemas: Arc::new(Mutex::new(Vec::new())),
            written_relationships: Arc::new(Mutex::new(Vec::new())),
            deleted_filters: Arc::new(Mutex::new(Vec::new())),
            imported_batches: Arc::new(Mutex::new(Vec::new())),
            export_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a `ReadSchema` success with the given text and token.
    #[must_use]
    pub fn with_schema(self, schema: &str, token: &str) -> Self {
        self.push_read_schema(Ok(ReadSchemaResponse {
            schema_text: schema.to_owned(),
            read_at: Some(ZedToken {
                token: token.to_owned(),
            }),
        }));
        self
    }

    /// Queues a raw `ReadSchema` outcome.
    #[must_use]
    pub fn with_read_schema(self, result: Result<ReadSchemaResponse, Status>) -> Self {
        self.push_read_schema(result);
        self
    }

    fn push_read_schema(&self, result: Result<ReadSchemaResponse, Status>) {
        if let Ok(mut q) = self.read_schema.lock() {
            q.push_back(result);
        }
    }

    /// Queues a `CheckPermission` outcome.
    #[must_use]
    pub fn with_check(self, result: Result<CheckPermissionResponse, Status>) -> Self {
        if let Ok(mut q) = self.check.lock() {
            q.push_back(result);
        }
        self
    }

    /// Queues a `CheckBulkPermissions` outcome.
    #[must_use]
    pub fn with_check_bulk(self, result: Result<CheckBulkPermissionsResponse, Status>) -> Self {
        if let Ok(mut q) = self.check_bulk.lock() {
            q.push_back(result);
        }
        self
    }

    /// Queues an `ExpandPermissionTree` outcome.
    #[must_use]
    pub fn with_expand(self, result: Result<ExpandPermissionTreeResponse, Status>) -> Self {
        if let Ok(mut q) = self.expand.lock() {
            q.push_back(result);
        }
        self
    }

    /// Queues a `WriteRelationships` outcome.
    #[must_use]
    pub fn with_write_result(self, result: Result<WriteRelationshipsResponse, Status>) -> Self {
        if let Ok(mut q) = self.write_rels.lock() {
            q.push_back(result);
        }
        self
    }

    /// Queues a `DeleteRelationships` outcome.
    #[must_use]
    pub fn with_delete_result(self, result: Result<DeleteRelationshipsResponse, Status>) -> Self {
        if let Ok(mut q) = self.delete_rels.lock() {
            q.push_back(result);
        }
        self
    }

    /// Queues one `LookupResources` stream session.
    #[must_use]
    pub fn with_lookup_resources_session(
        self,
        items: Vec<Result<LookupResourcesResponse, Status>>,
    ) -> Self {
        if let Ok(mut q) = self.lookup_resources.lock() {
            q.push_back(items);
        }
        self
    }

    /// Queues one `LookupSubjects` stream session.
    #[must_use]
    pub fn with_lookup_subjects_session(
        self,
        items: Vec<Result<LookupSubjectsResponse, Status>>,
    ) -> Self {
        if let Ok(mut q) = self.lookup_subjects.lock() {
            q.push_back(items);
        }
        self
    }

    /// Queues one `ReadRelationships` stream session.
    #[must_use]
    pub fn with_read_session(
        self,
        items: Vec<Result<ReadRelationshipsResponse, Status>>,
    ) -> Self {
        if let Ok(mut q) = self.read_rels.lock() {
            q.push_back(items);
        }
        self
    }

    /// Queues one `Watch` stream session.
    #[must_use]
    pub fn with_watch_session(self, items: Vec<Result<WatchResponse, Status>>) -> Self {
        if let Ok(mut q) = self.watch.lock() {
            q.push_back(items);
        }
        self
    }

    /// Queues one bulk-export stream session.
    #[must_use]
    pub fn with_export_session(
        self,
        items: Vec<Result<BulkExportRelationshipsResponse, Status>>,
    ) -> Self {
        if let Ok(mut q) = self.export.lock() {
            q.push_back(items);
        }
        self
    }

    /// Queues one bulk-import outcome; when exhausted, imports succeed
    /// with the full batch size.
    #[must_use]
    pub fn with_import_result(self, result: Result<u64, Status>) -> Self {
        if let Ok(mut q) = self.import.lock() {
            q.push_back(result);
        }
        self
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn read_schema(&self) -> ZedResult<ReadSchemaResponse> {
        match pop(&self.read_schema) {
            Some(result) => result.map_err(ZedError::from),
            None => Err(ZedError::from(Status::not_found("no schema"))),
        }
    }

    async fn write_schema(&self, schema: String) -> ZedResult<WriteSchemaResponse> {
        if let Ok(mut recorded) = self.written_schemas.lock() {
            recorded.push(schema);
        }
        match pop(&self.write_schema) {
            Some(result) => result.map_err(ZedError::from),
            None => Ok(WriteSchemaResponse {
                written_at: Some(ZedToken {
                    token: "mock-write".to_owned(),
                }),
            }),
        }
    }

    async fn check_permission(
        &self,
        _request: CheckPermissionRequest,
    ) -> ZedResult<CheckPermissionResponse> {
        match pop(&self.check) {
            Some(result) => result.map_err(ZedError::from),
            None => Err(ZedError::Internal("no mock check response queued".to_owned())),
        }
    }

    async fn check_bulk_permissions(
        &self,
        _request: CheckBulkPermissionsRequest,
    ) -> ZedResult<CheckBulkPermissionsResponse> {
        match pop(&self.check_bulk) {
            Some(result) => result.map_err(ZedError::from),
            None => Err(ZedError::Internal(
                "no mock bulk-check response queued".to_owned(),
            )),
        }
    }

    async fn expand_permission_tree(
        &self,
        _request: ExpandPermissionTreeRequest,
    ) -> ZedResult<ExpandPermissionTreeResponse> {
        match pop(&self.expand) {
            Some(result) => result.map_err(ZedError::from),
            None => Err(ZedError::Internal(
                "no mock expand response queued".to_owned(),
            )),
        }
    }

    async fn lookup_resources(
        &self,
        _request: LookupResourcesRequest,
    ) -> ZedResult<BoxedResponseStream<LookupResourcesResponse>> {
        Ok(boxed(pop_stream(&self.lookup_resources).unwrap_or_default()))
    }

    async fn lookup_subjects(
        &self,
        _request: LookupSubjectsRequest,
    ) -> ZedResult<BoxedResponseStream<LookupSubjectsResponse>> {
        Ok(boxed(pop_stream(&self.lookup_subjects).unwrap_or_default()))
    }

    async fn read_relationships(
        &self,
        _request: ReadRelationshipsRequest,
    ) -> ZedResult<BoxedResponseStream<ReadRelationshipsResponse>> {
        Ok(boxed(pop_stream(&self.read_rels).unwrap_or_default()))
    }

    async fn write_relationships(
        &self,
        request: WriteRelationshipsRequest,
    ) -> ZedResult<WriteRelationshipsResponse> {
        if let Ok(mut recorded) = self.written_relationships.lock() {
            recorded.push(request);
        }
        match pop(&self.write_rels) {
            Some(result) => result.map_err(ZedError::from),
            None => Ok(WriteRelationshipsResponse {
                written_at: Some(ZedToken {
                    token: "mock-write".to_owned(),
                }),
            }),
        }
    }

    async fn delete_relationships(
        &self,
        request: DeleteRelationshipsRequest,
    ) -> ZedResult<DeleteRelationshipsResponse> {
        if let Ok(mut recorded) = self.deleted_filters.lock() {
            recorded.push(request);
        }
        match pop(&self.delete_rels) {
            Some(result) => result.map_err(ZedError::from),
            None => Err(ZedError::Internal(
                "no mock delete response queued".to_owned(),
            )),
        }
    }

    async fn watch(&self, _request: WatchRequest) -> ZedResult<BoxedResponseStream<WatchResponse>> {
        Ok(boxed(pop_stream(&self.watch).unwrap_or_default()))
    }

    async fn bulk_export(
        &self,
        request: BulkExportRelationshipsRequest,
    ) -> ZedResult<BoxedResponseStream<BulkExportRelationshipsResponse>> {
        if let Ok(mut recorded) = self.export_requests.lock() {
            recorded.push(request);
        }
        Ok(boxed(pop_stream(&self.export).unwrap_or_default()))
    }

    async fn bulk_import(&self, relationships: Vec<Relationship>) -> ZedResult<u64> {
        let len = relationships.len() as u64;
        if let Ok(mut recorded) = self.imported_batches.lock() {
            recorded.push(relationships);
        }
        match pop(&self.import) {
            Some(result) => result.map_err(ZedError::from),
            None => Ok(len),
        }
    }
}
