//! Message types for the `authzed.api.v1` protocol surface.
//!
//! Field numbers mirror the published protocol. Only the subset of the API
//! the CLI consumes is carried here.

/// An opaque token identifying a consistency point of the relationship store.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ZedToken {
    /// The opaque token payload.
    #[prost(string, tag = "1")]
    pub token: String,
}

/// An opaque resumption cursor for paginated or streaming endpoints.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Cursor {
    /// The opaque cursor payload.
    #[prost(string, tag = "1")]
    pub token: String,
}

/// A reference to a single object: `type:id`.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ObjectReference {
    /// Namespaced object type, e.g. `document` or `tenant/document`.
    #[prost(string, tag = "1")]
    pub object_type: String,
    /// Object identifier within the type.
    #[prost(string, tag = "2")]
    pub object_id: String,
}

/// A reference to a subject, optionally narrowed to one of its relations.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubjectReference {
    /// The subject object.
    #[prost(message, optional, tag = "1")]
    pub object: Option<ObjectReference>,
    /// Relation on the subject (`group:eng#member`), empty for the object itself.
    #[prost(string, tag = "2")]
    pub optional_relation: String,
}

/// A caveat name plus the context it is evaluated against.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContextualizedCaveat {
    /// Name of the caveat definition in the schema.
    #[prost(string, tag = "1")]
    pub caveat_name: String,
    /// Partial evaluation context captured with the relationship.
    #[prost(message, optional, tag = "2")]
    pub context: Option<::prost_types::Struct>,
}

/// A single relationship: `resource#relation@subject`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Relationship {
    /// The resource side.
    #[prost(message, optional, tag = "1")]
    pub resource: Option<ObjectReference>,
    /// Relation connecting resource and subject.
    #[prost(string, tag = "2")]
    pub relation: String,
    /// The subject side.
    #[prost(message, optional, tag = "3")]
    pub subject: Option<SubjectReference>,
    /// Caveat qualifying the relationship, if any.
    #[prost(message, optional, tag = "4")]
    pub optional_caveat: Option<ContextualizedCaveat>,
    /// Wall-clock expiration, if any.
    #[prost(message, optional, tag = "5")]
    pub optional_expires_at: Option<::prost_types::Timestamp>,
}

/// Selects the revision at which a query is evaluated.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Consistency {
    /// Exactly one requirement must be set.
    #[prost(oneof = "consistency::Requirement", tags = "1, 2, 3, 4")]
    pub requirement: Option<consistency::Requirement>,
}

/// Nested types for [`Consistency`].
pub mod consistency {
    /// The consistency requirement variants.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Requirement {
        /// Evaluate at the revision with the lowest latency.
        #[prost(bool, tag = "1")]
        MinimizeLatency(bool),
        /// Evaluate at least as fresh as the given token.
        #[prost(message, tag = "2")]
        AtLeastAsFresh(super::ZedToken),
        /// Evaluate at exactly the snapshot named by the token.
        #[prost(message, tag = "3")]
        AtExactSnapshot(super::ZedToken),
        /// Evaluate at the head revision.
        #[prost(bool, tag = "4")]
        FullyConsistent(bool),
    }
}

/// A mutation of a single relationship.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RelationshipUpdate {
    /// The mutation kind.
    #[prost(enumeration = "relationship_update::Operation", tag = "1")]
    pub operation: i32,
    /// The relationship being mutated.
    #[prost(message, optional, tag = "2")]
    pub relationship: Option<Relationship>,
}

/// Nested types for [`RelationshipUpdate`].
pub mod relationship_update {
    /// Mutation kinds.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Operation {
        /// Zero value; never sent.
        Unspecified = 0,
        /// Create; fails if the relationship already exists.
        Create = 1,
        /// Upsert; succeeds whether or not the relationship exists.
        Touch = 2,
        /// Remove the relationship if present.
        Delete = 3,
    }
}

/// Filters subjects by type, id, and relation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubjectFilter {
    /// Required subject type.
    #[prost(string, tag = "1")]
    pub subject_type: String,
    /// Subject id, empty to match any.
    #[prost(string, tag = "2")]
    pub optional_subject_id: String,
    /// Subject relation filter; absent matches the object itself.
    #[prost(message, optional, tag = "3")]
    pub optional_relation: Option<subject_filter::RelationFilter>,
}

/// Nested types for [`SubjectFilter`].
pub mod subject_filter {
    /// Narrows a subject filter to a specific relation (empty = ellipsis).
    #[derive(Clone, PartialEq, Eq, ::prost::Message)]
    pub struct RelationFilter {
        /// Relation name, empty for the subject object itself.
        #[prost(string, tag = "1")]
        pub relation: String,
    }
}

/// Filters relationships by resource, relation, and subject.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RelationshipFilter {
    /// Resource type, empty to match any.
    #[prost(string, tag = "1")]
    pub resource_type: String,
    /// Exact resource id, empty to match any.
    #[prost(string, tag = "2")]
    pub optional_resource_id: String,
    /// Relation name, empty to match any.
    #[prost(string, tag = "3")]
    pub optional_relation: String,
    /// Subject filter, absent to match any subject.
    #[prost(message, optional, tag = "4")]
    pub optional_subject_filter: Option<SubjectFilter>,
    /// Resource id prefix, empty to match any.
    #[prost(string, tag = "5")]
    pub optional_resource_id_prefix: String,
}

/// Lists the caveat context keys missing from a partial evaluation.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PartialCaveatInfo {
    /// Context keys that must be provided for a definitive answer.
    #[prost(string, repeated, tag = "1")]
    pub missing_required_context: Vec<String>,
}

// ---------------------------------------------------------------------------
// SchemaService
// ---------------------------------------------------------------------------

/// Request for `SchemaService/ReadSchema`.
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct ReadSchemaRequest {}

/// Response for `SchemaService/ReadSchema`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadSchemaResponse {
    /// The schema text.
    #[prost(string, tag = "1")]
    pub schema_text: String,
    /// Revision at which the schema was read.
    #[prost(message, optional, tag = "2")]
    pub read_at: Option<ZedToken>,
}

/// Request for `SchemaService/WriteSchema`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct WriteSchemaRequest {
    /// The schema text to write.
    #[prost(string, tag = "1")]
    pub schema: String,
}

/// Response for `SchemaService/WriteSchema`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteSchemaResponse {
    /// Revision at which the schema was written.
    #[prost(message, optional, tag = "1")]
    pub written_at: Option<ZedToken>,
}

// ---------------------------------------------------------------------------
// PermissionsService
// ---------------------------------------------------------------------------

/// Request for `PermissionsService/CheckPermission`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckPermissionRequest {
    /// Consistency requirement.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// The resource being checked.
    #[prost(message, optional, tag = "2")]
    pub resource: Option<ObjectReference>,
    /// The permission (or relation) to check.
    #[prost(string, tag = "3")]
    pub permission: String,
    /// The subject the permission is checked for.
    #[prost(message, optional, tag = "4")]
    pub subject: Option<SubjectReference>,
    /// Caveat evaluation context.
    #[prost(message, optional, tag = "5")]
    pub context: Option<::prost_types::Struct>,
    /// Request a debug trace in the response.
    #[prost(bool, tag = "6")]
    pub with_tracing: bool,
}

/// Whether a subject holds a permission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Permissionship {
    /// Zero value; never sent.
    Unspecified = 0,
    /// The subject does not have the permission.
    NoPermission = 1,
    /// The subject has the permission.
    HasPermission = 2,
    /// The answer depends on caveat context that was not supplied.
    ConditionalPermission = 3,
}

/// Response for `PermissionsService/CheckPermission`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckPermissionResponse {
    /// Revision at which the check was evaluated.
    #[prost(message, optional, tag = "1")]
    pub checked_at: Option<ZedToken>,
    /// The answer.
    #[prost(enumeration = "Permissionship", tag = "2")]
    pub permissionship: i32,
    /// Missing caveat context, when conditional.
    #[prost(message, optional, tag = "3")]
    pub partial_caveat_info: Option<PartialCaveatInfo>,
    /// Debug trace, when requested.
    #[prost(message, optional, tag = "4")]
    pub debug_trace: Option<DebugInformation>,
}

/// One item of a bulk check request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckBulkPermissionsRequestItem {
    /// The resource being checked.
    #[prost(message, optional, tag = "1")]
    pub resource: Option<ObjectReference>,
    /// The permission to check.
    #[prost(string, tag = "2")]
    pub permission: String,
    /// The subject.
    #[prost(message, optional, tag = "3")]
    pub subject: Option<SubjectReference>,
    /// Caveat evaluation context.
    #[prost(message, optional, tag = "4")]
    pub context: Option<::prost_types::Struct>,
}

/// Request for `PermissionsService/CheckBulkPermissions`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckBulkPermissionsRequest {
    /// Consistency requirement shared by all items.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// The checks to perform.
    #[prost(message, repeated, tag = "2")]
    pub items: Vec<CheckBulkPermissionsRequestItem>,
    /// Request debug traces for every item.
    #[prost(bool, tag = "3")]
    pub with_tracing: bool,
}

/// Per-item answer of a bulk check.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckBulkPermissionsResponseItem {
    /// The answer for this item.
    #[prost(enumeration = "Permissionship", tag = "1")]
    pub permissionship: i32,
    /// Missing caveat context, when conditional.
    #[prost(message, optional, tag = "2")]
    pub partial_caveat_info: Option<PartialCaveatInfo>,
    /// Debug trace, when requested.
    #[prost(message, optional, tag = "3")]
    pub debug_trace: Option<DebugInformation>,
}

/// Pairs a bulk check item with its answer or error.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckBulkPermissionsPair {
    /// The request item this pair answers.
    #[prost(message, optional, tag = "1")]
    pub request: Option<CheckBulkPermissionsRequestItem>,
    /// Answer or per-item error.
    #[prost(oneof = "check_bulk_permissions_pair::Response", tags = "2, 3")]
    pub response: Option<check_bulk_permissions_pair::Response>,
}

/// Nested types for [`CheckBulkPermissionsPair`].
pub mod check_bulk_permissions_pair {
    /// Answer or per-item error.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        /// The item succeeded.
        #[prost(message, tag = "2")]
        Item(super::CheckBulkPermissionsResponseItem),
        /// The item failed with a structured status.
        #[prost(message, tag = "3")]
        Error(crate::rpc::Status),
    }
}

/// Response for `PermissionsService/CheckBulkPermissions`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckBulkPermissionsResponse {
    /// Revision at which all items were evaluated.
    #[prost(message, optional, tag = "1")]
    pub checked_at: Option<ZedToken>,
    /// One pair per request item, in request order.
    #[prost(message, repeated, tag = "2")]
    pub pairs: Vec<CheckBulkPermissionsPair>,
}

/// Request for `PermissionsService/ExpandPermissionTree`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExpandPermissionTreeRequest {
    /// Consistency requirement.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// The resource whose permission is expanded.
    #[prost(message, optional, tag = "2")]
    pub resource: Option<ObjectReference>,
    /// The permission (or relation) to expand.
    #[prost(string, tag = "3")]
    pub permission: String,
}

/// Response for `PermissionsService/ExpandPermissionTree`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExpandPermissionTreeResponse {
    /// Revision at which the tree was computed.
    #[prost(message, optional, tag = "1")]
    pub expanded_at: Option<ZedToken>,
    /// Root of the expansion tree.
    #[prost(message, optional, tag = "2")]
    pub tree_root: Option<PermissionRelationshipTree>,
}

/// A node of an expansion tree.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PermissionRelationshipTree {
    /// Intermediate (set-algebra) or leaf (direct subjects) node.
    #[prost(oneof = "permission_relationship_tree::TreeType", tags = "1, 2")]
    pub tree_type: Option<permission_relationship_tree::TreeType>,
    /// Object this node was expanded from.
    #[prost(message, optional, tag = "3")]
    pub expanded_object: Option<ObjectReference>,
    /// Relation this node was expanded through.
    #[prost(string, tag = "4")]
    pub expanded_relation: String,
}

/// Nested types for [`PermissionRelationshipTree`].
pub mod permission_relationship_tree {
    /// Node payload variants.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum TreeType {
        /// Set-algebraic combination of child trees.
        #[prost(message, tag = "1")]
        Intermediate(super::AlgebraicSubjectSet),
        /// Direct subjects.
        #[prost(message, tag = "2")]
        Leaf(super::DirectSubjectSet),
    }
}

/// A set-algebraic combination of subject sets.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AlgebraicSubjectSet {
    /// The set operation.
    #[prost(enumeration = "algebraic_subject_set::Operation", tag = "1")]
    pub operation: i32,
    /// The operand subtrees.
    #[prost(message, repeated, tag = "2")]
    pub children: Vec<PermissionRelationshipTree>,
}

/// Nested types for [`AlgebraicSubjectSet`].
pub mod algebraic_subject_set {
    /// Set operations over child trees.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Operation {
        /// Zero value; never sent.
        Unspecified = 0,
        /// Union of the children.
        Union = 1,
        /// Intersection of the children.
        Intersection = 2,
        /// First child minus the rest.
        Exclusion = 3,
    }
}

/// The direct subjects at a leaf of an expansion tree.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirectSubjectSet {
    /// The subjects.
    #[prost(message, repeated, tag = "1")]
    pub subjects: Vec<SubjectReference>,
}

/// Request for `PermissionsService/LookupResources` (server-streaming).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupResourcesRequest {
    /// Consistency requirement.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// Type of the resources to find.
    #[prost(string, tag = "2")]
    pub resource_object_type: String,
    /// Permission the subject must hold.
    #[prost(string, tag = "3")]
    pub permission: String,
    /// The subject.
    #[prost(message, optional, tag = "4")]
    pub subject: Option<SubjectReference>,
    /// Caveat evaluation context.
    #[prost(message, optional, tag = "5")]
    pub context: Option<::prost_types::Struct>,
    /// Maximum results, 0 for unlimited.
    #[prost(uint32, tag = "6")]
    pub optional_limit: u32,
    /// Resume cursor from a previous call.
    #[prost(message, optional, tag = "7")]
    pub optional_cursor: Option<Cursor>,
}

/// Whether a looked-up result holds unconditionally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LookupPermissionship {
    /// Zero value; never sent.
    Unspecified = 0,
    /// The result holds unconditionally.
    HasPermission = 1,
    /// The result holds only under caveat context not supplied.
    ConditionalPermission = 2,
}

/// One streamed result of `LookupResources`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupResourcesResponse {
    /// Revision at which the lookup was evaluated.
    #[prost(message, optional, tag = "1")]
    pub looked_up_at: Option<ZedToken>,
    /// Id of a matching resource.
    #[prost(string, tag = "2")]
    pub resource_object_id: String,
    /// Whether the match is conditional.
    #[prost(enumeration = "LookupPermissionship", tag = "3")]
    pub permissionship: i32,
    /// Missing caveat context, when conditional.
    #[prost(message, optional, tag = "4")]
    pub partial_caveat_info: Option<PartialCaveatInfo>,
    /// Cursor positioned after this result.
    #[prost(message, optional, tag = "5")]
    pub after_result_cursor: Option<Cursor>,
}

/// Request for `PermissionsService/LookupSubjects` (server-streaming).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupSubjectsRequest {
    /// Consistency requirement.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// The resource whose subjects are listed.
    #[prost(message, optional, tag = "2")]
    pub resource: Option<ObjectReference>,
    /// Permission the subjects must hold.
    #[prost(string, tag = "3")]
    pub permission: String,
    /// Type of the subjects to find.
    #[prost(string, tag = "4")]
    pub subject_object_type: String,
    /// Relation on the found subjects, empty for the objects themselves.
    #[prost(string, tag = "5")]
    pub optional_subject_relation: String,
    /// Caveat evaluation context.
    #[prost(message, optional, tag = "6")]
    pub context: Option<::prost_types::Struct>,
}

/// A subject found by `LookupSubjects`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResolvedSubject {
    /// Id of the subject.
    #[prost(string, tag = "1")]
    pub subject_object_id: String,
    /// Whether the match is conditional.
    #[prost(enumeration = "LookupPermissionship", tag = "2")]
    pub permissionship: i32,
    /// Missing caveat context, when conditional.
    #[prost(message, optional, tag = "3")]
    pub partial_caveat_info: Option<PartialCaveatInfo>,
}

/// One streamed result of `LookupSubjects`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupSubjectsResponse {
    /// Revision at which the lookup was evaluated.
    #[prost(message, optional, tag = "1")]
    pub looked_up_at: Option<ZedToken>,
    /// The found subject.
    #[prost(message, optional, tag = "2")]
    pub subject: Option<ResolvedSubject>,
    /// Subjects excluded from a wildcard match.
    #[prost(message, repeated, tag = "3")]
    pub excluded_subjects: Vec<ResolvedSubject>,
}

/// Request for `PermissionsService/ReadRelationships` (server-streaming).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRelationshipsRequest {
    /// Consistency requirement.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// Filter selecting the relationships to read.
    #[prost(message, optional, tag = "2")]
    pub relationship_filter: Option<RelationshipFilter>,
    /// Maximum results, 0 for unlimited.
    #[prost(uint32, tag = "3")]
    pub optional_limit: u32,
    /// Resume cursor from a previous call.
    #[prost(message, optional, tag = "4")]
    pub optional_cursor: Option<Cursor>,
}

/// One streamed result of `ReadRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRelationshipsResponse {
    /// Revision at which the read was evaluated.
    #[prost(message, optional, tag = "1")]
    pub read_at: Option<ZedToken>,
    /// The relationship.
    #[prost(message, optional, tag = "2")]
    pub relationship: Option<Relationship>,
    /// Cursor positioned after this result.
    #[prost(message, optional, tag = "3")]
    pub after_result_cursor: Option<Cursor>,
}

/// A precondition on a write or delete.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Precondition {
    /// Whether the filter must or must not match.
    #[prost(enumeration = "precondition::Operation", tag = "1")]
    pub operation: i32,
    /// The filter the precondition evaluates.
    #[prost(message, optional, tag = "2")]
    pub filter: Option<RelationshipFilter>,
}

/// Nested types for [`Precondition`].
pub mod precondition {
    /// Precondition polarity.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Operation {
        /// Zero value; never sent.
        Unspecified = 0,
        /// The filter must match no relationships.
        MustNotMatch = 1,
        /// The filter must match at least one relationship.
        MustMatch = 2,
    }
}

/// Request for `PermissionsService/WriteRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRelationshipsRequest {
    /// The mutations, applied atomically.
    #[prost(message, repeated, tag = "1")]
    pub updates: Vec<RelationshipUpdate>,
    /// Preconditions that must hold for the write to apply.
    #[prost(message, repeated, tag = "2")]
    pub optional_preconditions: Vec<Precondition>,
}

/// Response for `PermissionsService/WriteRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRelationshipsResponse {
    /// Revision at which the write was committed.
    #[prost(message, optional, tag = "1")]
    pub written_at: Option<ZedToken>,
}

/// Request for `PermissionsService/DeleteRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRelationshipsRequest {
    /// Filter selecting the relationships to delete.
    #[prost(message, optional, tag = "1")]
    pub relationship_filter: Option<RelationshipFilter>,
    /// Preconditions that must hold for the delete to apply.
    #[prost(message, repeated, tag = "2")]
    pub optional_preconditions: Vec<Precondition>,
    /// Maximum relationships to delete, 0 for unlimited.
    #[prost(uint32, tag = "3")]
    pub optional_limit: u32,
    /// Permit a partial delete when the limit is hit.
    #[prost(bool, tag = "4")]
    pub optional_allow_partial_deletions: bool,
}

/// Response for `PermissionsService/DeleteRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRelationshipsResponse {
    /// Revision at which the delete was committed.
    #[prost(message, optional, tag = "1")]
    pub deleted_at: Option<ZedToken>,
    /// Whether all matching relationships were deleted.
    #[prost(enumeration = "delete_relationships_response::DeletionProgress", tag = "2")]
    pub deletion_progress: i32,
    /// How many relationships were deleted.
    #[prost(uint64, tag = "3")]
    pub relationships_deleted_count: u64,
}

/// Nested types for [`DeleteRelationshipsResponse`].
pub mod delete_relationships_response {
    /// Whether the delete covered all matches.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum DeletionProgress {
        /// Zero value; never sent.
        Unspecified = 0,
        /// All matching relationships were deleted.
        Complete = 1,
        /// The limit was reached before all matches were deleted.
        Partial = 2,
    }
}

// ---------------------------------------------------------------------------
// WatchService
// ---------------------------------------------------------------------------

/// Request for `WatchService/Watch` (server-streaming).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchRequest {
    /// Restrict updates to these object types, empty for all.
    #[prost(string, repeated, tag = "1")]
    pub optional_object_types: Vec<String>,
    /// Start emitting changes after this revision.
    #[prost(message, optional, tag = "2")]
    pub optional_start_cursor: Option<ZedToken>,
    /// Restrict updates to these relationship filters, empty for all.
    #[prost(message, repeated, tag = "3")]
    pub optional_relationship_filters: Vec<RelationshipFilter>,
}

/// One streamed batch of changes from `Watch`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchResponse {
    /// The changes in this batch.
    #[prost(message, repeated, tag = "1")]
    pub updates: Vec<RelationshipUpdate>,
    /// Revision the stream has been delivered through.
    #[prost(message, optional, tag = "2")]
    pub changes_through: Option<ZedToken>,
}

// ---------------------------------------------------------------------------
// ExperimentalService
// ---------------------------------------------------------------------------

/// Request for `ExperimentalService/BulkExportRelationships` (server-streaming).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BulkExportRelationshipsRequest {
    /// Consistency requirement for the export snapshot.
    #[prost(message, optional, tag = "1")]
    pub consistency: Option<Consistency>,
    /// Page size hint for streamed batches.
    #[prost(uint32, tag = "2")]
    pub optional_limit: u32,
    /// Resume cursor from an interrupted export.
    #[prost(message, optional, tag = "3")]
    pub optional_cursor: Option<Cursor>,
    /// Restrict the export to matching relationships.
    #[prost(message, optional, tag = "4")]
    pub optional_relationship_filter: Option<RelationshipFilter>,
}

/// One streamed batch of `BulkExportRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BulkExportRelationshipsResponse {
    /// Cursor positioned after the last relationship of this batch.
    #[prost(message, optional, tag = "1")]
    pub after_result_cursor: Option<Cursor>,
    /// The relationships of this batch.
    #[prost(message, repeated, tag = "2")]
    pub relationships: Vec<Relationship>,
}

/// One client-streamed batch of `BulkImportRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BulkImportRelationshipsRequest {
    /// The relationships to create.
    #[prost(message, repeated, tag = "1")]
    pub relationships: Vec<Relationship>,
}

/// Response for `ExperimentalService/BulkImportRelationships`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BulkImportRelationshipsResponse {
    /// Total relationships loaded by the call.
    #[prost(uint64, tag = "1")]
    pub num_loaded: u64,
}

// ---------------------------------------------------------------------------
// Debug traces
// ---------------------------------------------------------------------------

/// Debug information attached to a check response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugInformation {
    /// The root check trace.
    #[prost(message, optional, tag = "1")]
    pub check: Option<CheckDebugTrace>,
    /// The schema the check was evaluated against.
    #[prost(string, tag = "2")]
    pub schema_used: String,
}

/// One node of a check debug trace.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckDebugTrace {
    /// The resource of this sub-check.
    #[prost(message, optional, tag = "1")]
    pub resource: Option<ObjectReference>,
    /// The permission of this sub-check.
    #[prost(string, tag = "2")]
    pub permission: String,
    /// The subject of this sub-check.
    #[prost(message, optional, tag = "3")]
    pub subject: Option<SubjectReference>,
    /// The result of this sub-check.
    #[prost(enumeration = "Permissionship", tag = "4")]
    pub result: i32,
    /// Whether the result came from cache.
    #[prost(bool, tag = "5")]
    pub was_cached_result: bool,
    /// The sub-checks this result was derived from.
    #[prost(message, optional, tag = "6")]
    pub sub_problems: Option<check_debug_trace::SubProblems>,
}

/// Nested types for [`CheckDebugTrace`].
pub mod check_debug_trace {
    /// Wrapper for child traces.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SubProblems {
        /// The child traces.
        #[prost(message, repeated, tag = "1")]
        pub traces: Vec<super::CheckDebugTrace>,
    }
}

impl Consistency {
    /// Consistency evaluating at the lowest-latency revision.
    #[must_use]
    pub fn minimize_latency() -> Self {
        Self {
            requirement: Some(consistency::Requirement::MinimizeLatency(true)),
        }
    }

    /// Consistency evaluating at least as fresh as `token`.
    #[must_use]
    pub fn at_least_as_fresh(token: ZedToken) -> Self {
        Self {
            requirement: Some(consistency::Requirement::AtLeastAsFresh(token)),
        }
    }

    /// Consistency evaluating at exactly the snapshot named by `token`.
    #[must_use]
    pub fn at_exact_snapshot(token: ZedToken) -> Self {
        Self {
            requirement: Some(consistency::Requirement::AtExactSnapshot(token)),
        }
    }

    /// Consistency evaluating at the head revision.
    #[must_use]
    pub fn fully_consistent() -> Self {
        Self {
            requirement: Some(consistency::Requirement::FullyConsistent(true)),
        }
    }
}
