//! The capability surface the rest of the CLI programs against.
//!
//! [`Backend`] exposes the four service capabilities (schema, permissions,
//! watch, experimental) over wire types. The production implementation,
//! [`GrpcBackend`], routes every call through the retry policy and stamps
//! the per-call metadata; tests substitute a fake implementing only the
//! methods under test.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use zed_core::ZedResult;
use zed_proto::v1::{
    BulkExportRelationshipsRequest, BulkExportRelationshipsResponse,
    BulkImportRelationshipsRequest, CheckBulkPermissionsRequest, CheckBulkPermissionsResponse,
    CheckPermissionRequest, CheckPermissionResponse, DeleteRelationshipsRequest,
    DeleteRelationshipsResponse, ExpandPermissionTreeRequest, ExpandPermissionTreeResponse,
    LookupResourcesRequest, LookupResourcesResponse, LookupSubjectsRequest,
    LookupSubjectsResponse, ReadRelationshipsRequest, ReadRelationshipsResponse,
    ReadSchemaRequest, ReadSchemaResponse, Relationship, WatchRequest, WatchResponse,
    WriteRelationshipsRequest, WriteRelationshipsResponse, WriteSchemaRequest,
    WriteSchemaResponse,
};
use zed_proto::{
    ExperimentalServiceClient, PermissionsServiceClient, SchemaServiceClient, WatchServiceClient,
};

use crate::metadata::CallMetadata;
use crate::retry::{self, RetryPolicy};

const SCHEMA: &str = "authzed.api.v1.SchemaService";
const PERMISSIONS: &str = "authzed.api.v1.PermissionsService";
const WATCH: &str = "authzed.api.v1.WatchService";
const EXPERIMENTAL: &str = "authzed.api.v1.ExperimentalService";

/// A streamed sequence of responses; failures after the first message
/// propagate to the consumer untouched.
pub type BoxedResponseStream<T> = BoxStream<'static, Result<T, tonic::Status>>;

/// The full method set of the permissions service.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Reads the current schema.
    async fn read_schema(&self) -> ZedResult<ReadSchemaResponse>;

    /// Writes a new schema.
    async fn write_schema(&self, schema: String) -> ZedResult<WriteSchemaResponse>;

    /// Checks a single permission.
    async fn check_permission(
        &self,
        request: CheckPermissionRequest,
    ) -> ZedResult<CheckPermissionResponse>;

    /// Checks many permissions in one round trip.
    async fn check_bulk_permissions(
        &self,
        request: CheckBulkPermissionsRequest,
    ) -> ZedResult<CheckBulkPermissionsResponse>;

    /// Expands the subject tree behind a permission.
    async fn expand_permission_tree(
        &self,
        request: ExpandPermissionTreeRequest,
    ) -> ZedResult<ExpandPermissionTreeResponse>;

    /// Streams resources the subject holds a permission on.
    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> ZedResult<BoxedResponseStream<LookupResourcesResponse>>;

    /// Streams subjects holding a permission on a resource.
    async fn lookup_subjects(
        &self,
        request: LookupSubjectsRequest,
    ) -> ZedResult<BoxedResponseStream<LookupSubjectsResponse>>;

    /// Streams relationships matching a filter.
    async fn read_relationships(
        &self,
        request: ReadRelationshipsRequest,
    ) -> ZedResult<BoxedResponseStream<ReadRelationshipsResponse>>;

    /// Applies relationship mutations atomically.
    async fn write_relationships(
        &self,
        request: WriteRelationshipsRequest,
    ) -> ZedResult<WriteRelationshipsResponse>;

    /// Deletes relationships matching a filter.
    async fn delete_relationships(
        &self,
        request: DeleteRelationshipsRequest,
    ) -> ZedResult<DeleteRelationshipsResponse>;

    /// Streams committed changes.
    async fn watch(&self, request: WatchRequest) -> ZedResult<BoxedResponseStream<WatchResponse>>;

    /// Streams the whole store for backup.
    async fn bulk_export(
        &self,
        request: BulkExportRelationshipsRequest,
    ) -> ZedResult<BoxedResponseStream<BulkExportRelationshipsResponse>>;

    /// Loads one batch of relationships; returns how many were loaded.
    async fn bulk_import(&self, relationships: Vec<Relationship>) -> ZedResult<u64>;
}

/// The production [`Backend`] over a tonic channel.
#[derive(Clone)]
pub struct GrpcBackend {
    schema: SchemaServiceClient,
    permissions: PermissionsServiceClient,
    watch: WatchServiceClient,
    experimental: ExperimentalServiceClient,
    metadata: CallMetadata,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl GrpcBackend {
    /// Wraps a connected channel with the shared transport policy.
    #[must_use]
    pub fn new(
        channel: Channel,
        metadata: CallMetadata,
        policy: RetryPolicy,
        cancel: CancellationToken,
        max_message_size: usize,
    ) -> Self {
        Self {
            schema: SchemaServiceClient::with_message_limits(channel.clone(), max_message_size),
            permissions: PermissionsServiceClient::with_message_limits(
                channel.clone(),
                max_message_size,
            ),
            watch: WatchServiceClient::with_message_limits(channel.clone(), max_message_size),
            experimental: ExperimentalServiceClient::with_message_limits(
                channel,
                max_message_size,
            ),
            metadata,
            policy,
            cancel,
        }
    }

    /// The schema client, bypassing retries (used by the version handshake).
    pub(crate) fn raw_schema(&self) -> SchemaServiceClient {
        self.schema.clone()
    }

    /// The metadata stamp shared by every call.
    pub(crate) fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }
}

#[async_trait]
impl Backend for GrpcBackend {
    async fn read_schema(&self) -> ZedResult<ReadSchemaResponse> {
        let method = self.policy.for_method(SCHEMA, "ReadSchema");
        let client = self.schema.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            ReadSchemaRequest {},
            move |req| {
                let mut client = client.clone();
                async move { client.read_schema(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn write_schema(&self, schema: String) -> ZedResult<WriteSchemaResponse> {
        let method = self.policy.for_method(SCHEMA, "WriteSchema");
        let client = self.schema.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            WriteSchemaRequest { schema },
            move |req| {
                let mut client = client.clone();
                async move { client.write_schema(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn check_permission(
        &self,
        request: CheckPermissionRequest,
    ) -> ZedResult<CheckPermissionResponse> {
        let method = self.policy.for_method(PERMISSIONS, "CheckPermission");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.check_permission(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn check_bulk_permissions(
        &self,
        request: CheckBulkPermissionsRequest,
    ) -> ZedResult<CheckBulkPermissionsResponse> {
        let method = self.policy.for_method(PERMISSIONS, "CheckBulkPermissions");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.check_bulk_permissions(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn expand_permission_tree(
        &self,
        request: ExpandPermissionTreeRequest,
    ) -> ZedResult<ExpandPermissionTreeResponse> {
        let method = self.policy.for_method(PERMISSIONS, "ExpandPermissionTree");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.expand_permission_tree(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> ZedResult<BoxedResponseStream<LookupResourcesResponse>> {
        let method = self.policy.for_method(PERMISSIONS, "LookupResources");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.lookup_resources(req).await }
            },
        )
        .await?;
        Ok(response.into_inner().boxed())
    }

    async fn lookup_subjects(
        &self,
        request: LookupSubjectsRequest,
    ) -> ZedResult<BoxedResponseStream<LookupSubjectsResponse>> {
        let method = self.policy.for_method(PERMISSIONS, "LookupSubjects");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.lookup_subjects(req).await }
            },
        )
        .await?;
        Ok(response.into_inner().boxed())
    }

    async fn read_relationships(
        &self,
        request: ReadRelationshipsRequest,
    ) -> ZedResult<BoxedResponseStream<ReadRelationshipsResponse>> {
        let method = self.policy.for_method(PERMISSIONS, "ReadRelationships");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.read_relationships(req).await }
            },
        )
        .await?;
        Ok(response.into_inner().boxed())
    }

    async fn write_relationships(
        &self,
        request: WriteRelationshipsRequest,
    ) -> ZedResult<WriteRelationshipsResponse> {
        let method = self.policy.for_method(PERMISSIONS, "WriteRelationships");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.write_relationships(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn delete_relationships(
        &self,
        request: DeleteRelationshipsRequest,
    ) -> ZedResult<DeleteRelationshipsResponse> {
        let method = self.policy.for_method(PERMISSIONS, "DeleteRelationships");
        let client = self.permissions.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.delete_relationships(req).await }
            },
        )
        .await?;
        Ok(response.into_inner())
    }

    async fn watch(&self, request: WatchRequest) -> ZedResult<BoxedResponseStream<WatchResponse>> {
        let method = self.policy.for_method(WATCH, "Watch");
        let client = self.watch.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.watch(req).await }
            },
        )
        .await?;
        Ok(response.into_inner().boxed())
    }

    async fn bulk_export(
        &self,
        request: BulkExportRelationshipsRequest,
    ) -> ZedResult<BoxedResponseStream<BulkExportRelationshipsResponse>> {
        let method = self
            .policy
            .for_method(EXPERIMENTAL, "BulkExportRelationships");
        let client = self.experimental.clone();
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            request,
            move |req| {
                let mut client = client.clone();
                async move { client.bulk_export_relationships(req).await }
            },
        )
        .await?;
        Ok(response.into_inner().boxed())
    }

    async fn bulk_import(&self, relationships: Vec<Relationship>) -> ZedResult<u64> {
        let method = self
            .policy
            .for_method(EXPERIMENTAL, "BulkImportRelationships");
        let client = self.experimental.clone();
        let message = BulkImportRelationshipsRequest { relationships };
        let response = retry::run(
            &self.policy,
            &method,
            &self.cancel,
            &self.metadata,
            message,
            move |req| {
                let mut client = client.clone();
                async move {
                    let (metadata, _, message) = req.into_parts();
                    let mut streaming =
                        tonic::Request::new(futures::stream::iter(vec![message]));
                    *streaming.metadata_mut() = metadata;
                    client.bulk_import_relationships(streaming).await
                }
            },
        )
        .await?;
        Ok(response.into_inner().num_loaded)
    }
}
