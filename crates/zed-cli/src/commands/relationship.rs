//! Relationship commands.


use clap::{Args, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use zed_core::{tuple, ZedError, ZedResult};
use zed_proto::v1::delete_relationships_response::DeletionProgress;
use zed_proto::v1::relationship_update::Operation;
use zed_proto::v1::subject_filter::RelationFilter;
use zed_proto::v1::{
    Cursor, DeleteRelationshipsRequest, ReadRelationshipsRequest, Relationship,
    RelationshipFilter, RelationshipUpdate, SubjectFilter, WriteRelationshipsRequest,
};

use crate::client::connect;
use crate::flags::{ConsistencyFlags, GlobalArgs};
use crate::theme::Theme;

#[derive(Subcommand)]
pub(crate) enum RelationshipCommands {
    /// Create a relationship; fails if it already exists
    Create(MutateArgs),

    /// Create or update a relationship
    Touch(MutateArgs),

    /// Delete a single relationship
    Delete(MutateArgs),

    /// Stream relationships matching a filter
    Read(ReadArgs),

    /// Delete every relationship matching a filter
    BulkDelete(BulkDeleteArgs),
}

#[derive(Args)]
pub(crate) struct MutateArgs {
    /// Resource as type:id
    resource: String,
    /// Relation connecting resource and subject
    relation: String,
    /// Subject as type:id or type:id#relation
    subject: String,

    /// Caveat as name or name:{json}
    #[arg(long)]
    caveat: Option<String>,

    /// Expire the relationship at this RFC 3339 timestamp
    #[arg(long)]
    expiration: Option<String>,
}

#[derive(Args)]
pub(crate) struct ReadArgs {
    /// Resource filter as type or type:id
    resource: String,
    /// Relation filter
    relation: Option<String>,

    /// Subject filter as type, type:id, or type:id#relation
    #[arg(long)]
    subject_filter: Option<String>,

    /// Stop after this many results
    #[arg(long)]
    page_limit: Option<u32>,

    /// Resume from a cursor printed by a previous run
    #[arg(long)]
    cursor: Option<String>,

    #[command(flatten)]
    consistency: ConsistencyFlags,
}

#[derive(Args)]
pub(crate) struct BulkDeleteArgs {
    /// Resource filter as type or type:id
    resource: String,
    /// Relation filter
    relation: Option<String>,

    /// Subject filter as type, type:id, or type:id#relation
    #[arg(long)]
    subject_filter: Option<String>,

    /// Delete in chunks of this size
    #[arg(long, default_value_t = 1_000)]
    batch_size: u32,

    /// Overall cap on deleted relationships
    #[arg(long)]
    optional_limit: Option<u32>,

    /// Skip the confirmation prompt
    #[arg(long)]
    force: bool,
}

pub(crate) async fn run(
    command: RelationshipCommands,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    match command {
        RelationshipCommands::Create(args) => {
            mutate(args, Operation::Create, globals, cancel).await
        }
        RelationshipCommands::Touch(args) => mutate(args, Operation::Touch, globals, cancel).await,
        RelationshipCommands::Delete(args) => {
            mutate(args, Operation::Delete, globals, cancel).await
        }
        RelationshipCommands::Read(args) => read(args, globals, cancel).await,
        RelationshipCommands::BulkDelete(args) => bulk_delete(args, globals, cancel).await,
    }
}

fn build_relationship(args: &MutateArgs) -> ZedResult<Relationship> {
    let optional_caveat = args
        .caveat
        .as_deref()
        .map(tuple::parse_caveat)
        .transpose()?;
    let optional_expires_at = args
        .expiration
        .as_deref()
        .map(tuple::parse_timestamp)
        .transpose()?;
    Ok(Relationship {
        resource: Some(tuple::parse_object(&args.resource)?),
        relation: args.relation.clone(),
        subject: Some(tuple::parse_subject(&args.subject)?),
        optional_caveat,
        optional_expires_at,
    })
}

/// Parses `type`, `type:id`, or `type:id#relation` into a subject filter.
fn parse_subject_filter(raw: &str) -> ZedResult<SubjectFilter> {
    let (object_part, relation) = match raw.split_once('#') {
        Some((object, relation)) => (object, Some(relation.to_owned())),
        None => (raw, None),
    };
    let (subject_type, subject_id) = match object_part.split_once(':') {
        Some((t, id)) => (t.to_owned(), id.to_owned()),
        None => (object_part.to_owned(), String::new()),
    };
    if subject_type.is_empty() {
        return Err(ZedError::Validation(format!(
            "invalid --subject-filter \"{raw}\""
        )));
    }
    Ok(SubjectFilter {
        subject_type,
        optional_subject_id: subject_id,
        optional_relation: relation.map(|relation| RelationFilter { relation }),
    })
}

fn build_filter(
    resource: &str,
    relation: Option<&str>,
    subject_filter: Option<&str>,
) -> ZedResult<RelationshipFilter> {
    let (resource_type, resource_id) = match resource.split_once(':') {
        Some((t, id)) => (t.to_owned(), id.to_owned()),
        None => (resource.to_owned(), String::new()),
    };
    if resource_type.is_empty() {
        return Err(ZedError::Validation(format!(
            "invalid resource filter \"{resource}\""
        )));
    }
    Ok(RelationshipFilter {
        resource_type,
        optional_resource_id: resource_id,
        optional_relation: relation.unwrap_or_default().to_owned(),
        optional_subject_filter: subject_filter.map(parse_subject_filter).transpose()?,
        optional_resource_id_prefix: String::new(),
    })
}

async fn mutate(
    args: MutateArgs,
    operation: Operation,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let relationship = build_relationship(&args)?;
    let request = WriteRelationshipsRequest {
        updates: vec![RelationshipUpdate {
            operation: operation as i32,
            relationship: Some(relationship),
        }],
        optional_preconditions: Vec::new(),
    };

    let backend = connect(globals, &cancel).await?;
    let response = backend.write_relationships(request).await?;
    println!(
        "{}",
        response.written_at.map(|t| t.token).unwrap_or_default()
    );
    Ok(0)
}

async fn read(
    args: ReadArgs,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let request = ReadRelationshipsRequest {
        consistency: Some(args.consistency.resolve()?),
        relationship_filter: Some(build_filter(
            &args.resource,
            args.relation.as_deref(),
            args.subject_filter.as_deref(),
        )?),
        optional_limit: args.page_limit.unwrap_or(0),
        optional_cursor: args.cursor.clone().map(|token| Cursor { token }),
    };

    let backend = connect(globals, &cancel).await?;
    let mut stream = backend.read_relationships(request).await?;
    let mut last_cursor: Option<String> = None;

    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return Err(ZedError::Cancelled),
            item = stream.next() => item,
        };
        match item {
            None => break,
            Some(Ok(row)) => {
                if let Some(rel) = &row.relationship {
                    println!("{}", tuple::format(rel));
                }
                last_cursor = row.after_result_cursor.map(|c| c.token);
            }
            Some(Err(status)) => return Err(status.into()),
        }
    }
    if let Some(cursor) = last_cursor {
        eprintln!("{}", Theme::dimmed(&format!("cursor: {cursor}")));
    }
    Ok(0)
}

async fn bulk_delete(
    args: BulkDeleteArgs,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let filter = build_filter(
        &args.resource,
        args.relation.as_deref(),
        args.subject_filter.as_deref(),
    )?;

    if !args.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Delete all relationships matching {}{}?",
                filter.resource_type,
                if filter.optional_relation.is_empty() {
                    String::new()
                } else {
                    format!("#{}", filter.optional_relation)
                }
            ))
            .default(false)
            .interact()
            .map_err(|err| ZedError::Internal(err.to_string()))?;
        if !confirmed {
            println!("{}", Theme::dimmed("aborted"));
            return Ok(0);
        }
    }

    let backend = connect(globals, &cancel).await?;
    let mut total: u64 = 0;
    let mut remaining = args.optional_limit.map(u64::from);

    // Delete in bounded chunks until the server reports completion, so a
    // huge match set never has to fit one transaction.
    loop {
        if cancel.is_cancelled() {
            // Partial failure still reports the count actually deleted.
            println!("deleted {total}");
            return Err(ZedError::Cancelled);
        }
        let chunk = match remaining {
            Some(0) => break,
            Some(n) => n.min(u64::from(args.batch_size)),
            None => u64::from(args.batch_size),
        };
        let request = DeleteRelationshipsRequest {
            relationship_filter: Some(filter.clone()),
            optional_preconditions: Vec::new(),
            optional_limit: u32::try_from(chunk).unwrap_or(u32::MAX),
            optional_allow_partial_deletions: true,
        };
        let response = match backend.delete_relationships(request).await {
            Ok(response) => response,
            Err(err) => {
                println!("deleted {total}");
                return Err(err);
            }
        };
        total += response.relationships_deleted_count;
        if let Some(n) = remaining.as_mut() {
            *n = n.saturating_sub(response.relationships_deleted_count);
        }
        if response.deletion_progress == DeletionProgress::Complete as i32 {
            break;
        }
    }

    println!("deleted {total}");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_filters_parse_all_three_shapes() {
        let f = parse_subject_filter("user").unwrap();
        assert_eq!(f.subject_type, "user");
        assert!(f.optional_subject_id.is_empty());
        assert!(f.optional_relation.is_none());

        let f = parse_subject_filter("user:alice").unwrap();
        assert_eq!(f.optional_subject_id, "alice");

        let f = parse_subject_filter("group:eng#member").unwrap();
        assert_eq!(f.optional_relation.unwrap().relation, "member");

        assert!(parse_subject_filter(":oops").is_err());
    }

    #[test]
    fn resource_filters_accept_bare_types_and_ids() {
        let f = build_filter("document", None, None).unwrap();
        assert_eq!(f.resource_type, "document");
        assert!(f.optional_resource_id.is_empty());

        let f = build_filter("document:doc1", Some("viewer"), Some("user:alice")).unwrap();
        assert_eq!(f.optional_resource_id, "doc1");
        assert_eq!(f.optional_relation, "viewer");
        assert_eq!(
            f.optional_subject_filter.unwrap().optional_subject_id,
            "alice"
        );
    }

    #[test]
    fn mutations_carry_caveats_and_expirations() {
        let args = MutateArgs {
            resource: "document:doc1".to_owned(),
            relation: "viewer".to_owned(),
            subject: "user:alice".to_owned(),
            caveat: Some("tuesday_only".to_owned()),
            expiration: Some("2026-06-01T00:00:00Z".to_owned()),
        };
        let rel = build_relationship(&args).unwrap();
        assert_eq!(rel.optional_caveat.unwrap().caveat_name, "tuesday_only");
        assert!(rel.optional_expires_at.is_some());

        let bad = MutateArgs {
            expiration: Some("not a time".to_owned()),
            ..MutateArgs {
                resource: "document:doc1".to_owned(),
                relation: "viewer".to_owned(),
                subject: "user:alice".to_owned(),
                caveat: None,
                expiration: None,
            }
        };
        assert!(build_relationship(&bad).is_err());
    }
}
