//! Concrete gRPC clients for the four permission-service capabilities.
//!
//! These follow the shape the protobuf toolchain would generate, made
//! concrete over [`tonic::transport::Channel`]. Message-size limits are
//! applied at construction via [`with_message_limits`](SchemaServiceClient::with_message_limits)
//! so every capability shares the transport policy.

use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;
use tonic::{IntoRequest, IntoStreamingRequest, Response, Status, Streaming};

use crate::v1;

fn not_ready(err: tonic::transport::Error) -> Status {
    Status::unknown(format!("transport was not ready: {err}"))
}

/// Client for the schema capability.
#[derive(Debug, Clone)]
pub struct SchemaServiceClient {
    inner: Grpc<Channel>,
}

impl SchemaServiceClient {
    /// Creates a client with tonic's default message-size limits.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    /// Creates a client with symmetric send/receive message-size limits.
    #[must_use]
    pub fn with_message_limits(channel: Channel, max_bytes: usize) -> Self {
        Self {
            inner: Grpc::new(channel)
                .max_decoding_message_size(max_bytes)
                .max_encoding_message_size(max_bytes),
        }
    }

    /// Reads the current schema.
    pub async fn read_schema(
        &mut self,
        request: impl IntoRequest<v1::ReadSchemaRequest>,
    ) -> Result<Response<v1::ReadSchemaResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::ReadSchemaRequest, v1::ReadSchemaResponse> =
            ProstCodec::default();
        let path = PathAndQuery::from_static("/authzed.api.v1.SchemaService/ReadSchema");
        self.inner.unary(request.into_request(), path, codec).await
    }

    /// Writes a new schema.
    pub async fn write_schema(
        &mut self,
        request: impl IntoRequest<v1::WriteSchemaRequest>,
    ) -> Result<Response<v1::WriteSchemaResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::WriteSchemaRequest, v1::WriteSchemaResponse> =
            ProstCodec::default();
        let path = PathAndQuery::from_static("/authzed.api.v1.SchemaService/WriteSchema");
        self.inner.unary(request.into_request(), path, codec).await
    }
}

/// Client for the permissions capability.
#[derive(Debug, Clone)]
pub struct PermissionsServiceClient {
    inner: Grpc<Channel>,
}

impl PermissionsServiceClient {
    /// Creates a client with tonic's default message-size limits.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    /// Creates a client with symmetric send/receive message-size limits.
    #[must_use]
    pub fn with_message_limits(channel: Channel, max_bytes: usize) -> Self {
        Self {
            inner: Grpc::new(channel)
                .max_decoding_message_size(max_bytes)
                .max_encoding_message_size(max_bytes),
        }
    }

    /// Checks a single permission.
    pub async fn check_permission(
        &mut self,
        request: impl IntoRequest<v1::CheckPermissionRequest>,
    ) -> Result<Response<v1::CheckPermissionResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::CheckPermissionRequest, v1::CheckPermissionResponse> =
            ProstCodec::default();
        let path =
            PathAndQuery::from_static("/authzed.api.v1.PermissionsService/CheckPermission");
        self.inner.unary(request.into_request(), path, codec).await
    }

    /// Checks many permissions in one round trip.
    pub async fn check_bulk_permissions(
        &mut self,
        request: impl IntoRequest<v1::CheckBulkPermissionsRequest>,
    ) -> Result<Response<v1::CheckBulkPermissionsResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::CheckBulkPermissionsRequest, v1::CheckBulkPermissionsResponse> =
            ProstCodec::default();
        let path = PathAndQuery::from_static(
            "/authzed.api.v1.PermissionsService/CheckBulkPermissions",
        );
        self.inner.unary(request.into_request(), path, codec).await
    }

    /// Expands the subject tree behind a permission.
    pub async fn expand_permission_tree(
        &mut self,
        request: impl IntoRequest<v1::ExpandPermissionTreeRequest>,
    ) -> Result<Response<v1::ExpandPermissionTreeResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::ExpandPermissionTreeRequest, v1::ExpandPermissionTreeResponse> =
            ProstCodec::default();
        let path = PathAndQuery::from_static(
            "/authzed.api.v1.PermissionsService/ExpandPermissionTree",
        );
        self.inner.unary(request.into_request(), path, codec).await
    }

    /// Streams the resources a subject can reach through a permission.
    pub async fn lookup_resources(
        &mut self,
        request: impl IntoRequest<v1::LookupResourcesRequest>,
    ) -> Result<Response<Streaming<v1::LookupResourcesResponse>>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::LookupResourcesRequest, v1::LookupResourcesResponse> =
            ProstCodec::default();
        let path =
            PathAndQuery::from_static("/authzed.api.v1.PermissionsService/LookupResources");
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }

    /// Streams the subjects holding a permission on a resource.
    pub async fn lookup_subjects(
        &mut self,
        request: impl IntoRequest<v1::LookupSubjectsRequest>,
    ) -> Result<Response<Streaming<v1::LookupSubjectsResponse>>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::LookupSubjectsRequest, v1::LookupSubjectsResponse> =
            ProstCodec::default();
        let path =
            PathAndQuery::from_static("/authzed.api.v1.PermissionsService/LookupSubjects");
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }

    /// Streams relationships matching a filter.
    pub async fn read_relationships(
        &mut self,
        request: impl IntoRequest<v1::ReadRelationshipsRequest>,
    ) -> Result<Response<Streaming<v1::ReadRelationshipsResponse>>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::ReadRelationshipsRequest, v1::ReadRelationshipsResponse> =
            ProstCodec::default();
        let path =
            PathAndQuery::from_static("/authzed.api.v1.PermissionsService/ReadRelationships");
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }

    /// Applies a batch of relationship mutations atomically.
    pub async fn write_relationships(
        &mut self,
        request: impl IntoRequest<v1::WriteRelationshipsRequest>,
    ) -> Result<Response<v1::WriteRelationshipsResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::WriteRelationshipsRequest, v1::WriteRelationshipsResponse> =
            ProstCodec::default();
        let path =
            PathAndQuery::from_static("/authzed.api.v1.PermissionsService/WriteRelationships");
        self.inner.unary(request.into_request(), path, codec).await
    }

    /// Deletes all relationships matching a filter.
    pub async fn delete_relationships(
        &mut self,
        request: impl IntoRequest<v1::DeleteRelationshipsRequest>,
    ) -> Result<Response<v1::DeleteRelationshipsResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::DeleteRelationshipsRequest, v1::DeleteRelationshipsResponse> =
            ProstCodec::default();
        let path =
            PathAndQuery::from_static("/authzed.api.v1.PermissionsService/DeleteRelationships");
        self.inner.unary(request.into_request(), path, codec).await
    }
}

/// Client for the watch capability.
#[derive(Debug, Clone)]
pub struct WatchServiceClient {
    inner: Grpc<Channel>,
}

impl WatchServiceClient {
    /// Creates a client with tonic's default message-size limits.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    /// Creates a client with symmetric send/receive message-size limits.
    #[must_use]
    pub fn with_message_limits(channel: Channel, max_bytes: usize) -> Self {
        Self {
            inner: Grpc::new(channel)
                .max_decoding_message_size(max_bytes)
                .max_encoding_message_size(max_bytes),
        }
    }

    /// Streams relationship changes as they are committed.
    pub async fn watch(
        &mut self,
        request: impl IntoRequest<v1::WatchRequest>,
    ) -> Result<Response<Streaming<v1::WatchResponse>>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<v1::WatchRequest, v1::WatchResponse> = ProstCodec::default();
        let path = PathAndQuery::from_static("/authzed.api.v1.WatchService/Watch");
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }
}

/// Client for the experimental bulk capability.
#[derive(Debug, Clone)]
pub struct ExperimentalServiceClient {
    inner: Grpc<Channel>,
}

impl ExperimentalServiceClient {
    /// Creates a client with tonic's default message-size limits.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    /// Creates a client with symmetric send/receive message-size limits.
    #[must_use]
    pub fn with_message_limits(channel: Channel, max_bytes: usize) -> Self {
        Self {
            inner: Grpc::new(channel)
                .max_decoding_message_size(max_bytes)
                .max_encoding_message_size(max_bytes),
        }
    }

    /// Streams every relationship of the store in cursor order.
    pub async fn bulk_export_relationships(
        &mut self,
        request: impl IntoRequest<v1::BulkExportRelationshipsRequest>,
    ) -> Result<Response<Streaming<v1::BulkExportRelationshipsResponse>>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<
            v1::BulkExportRelationshipsRequest,
            v1::BulkExportRelationshipsResponse,
        > = ProstCodec::default();
        let path = PathAndQuery::from_static(
            "/authzed.api.v1.ExperimentalService/BulkExportRelationships",
        );
        self.inner
            .server_streaming(request.into_request(), path, codec)
            .await
    }

    /// Loads relationships in bulk from a client stream of batches.
    pub async fn bulk_import_relationships(
        &mut self,
        request: impl IntoStreamingRequest<Message = v1::BulkImportRelationshipsRequest>,
    ) -> Result<Response<v1::BulkImportRelationshipsResponse>, Status> {
        self.inner.ready().await.map_err(not_ready)?;
        let codec: ProstCodec<
            v1::BulkImportRelationshipsRequest,
            v1::BulkImportRelationshipsResponse,
        > = ProstCodec::default();
        let path = PathAndQuery::from_static(
            "/authzed.api.v1.ExperimentalService/BulkImportRelationships",
        );
        self.inner
            .client_streaming(request.into_streaming_request(), path, codec)
            .await
    }
}
