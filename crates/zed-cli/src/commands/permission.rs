//! Permission query commands.

use std::sync::Arc;

use clap::{Args, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use zed_client::Backend;
use zed_core::{tuple, ZedError, ZedResult};
use zed_proto::v1::check_bulk_permissions_pair::Response as PairResponse;
use zed_proto::v1::{
    algebraic_subject_set, permission_relationship_tree::TreeType, CheckBulkPermissionsRequest,
    CheckBulkPermissionsRequestItem, CheckPermissionRequest, Cursor,
    ExpandPermissionTreeRequest, LookupPermissionship, LookupResourcesRequest,
    LookupSubjectsRequest, PermissionRelationshipTree, Permissionship,
};

use crate::client::connect;
use crate::explain;
use crate::flags::{ConsistencyFlags, GlobalArgs};
use crate::theme::Theme;

#[derive(Subcommand)]
pub(crate) enum PermissionCommands {
    /// Check whether a subject has a permission on a resource
    Check(CheckArgs),

    /// Check many permissions in one round trip
    CheckBulk(CheckBulkArgs),

    /// Expand the subject tree behind a permission
    Expand(ExpandArgs),

    /// Stream the resources a subject holds a permission on
    LookupResources(LookupResourcesArgs),

    /// Stream the subjects holding a permission on a resource
    LookupSubjects(LookupSubjectsArgs),
}

#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Resource as type:id
    resource: String,
    /// Permission or relation to check
    permission: String,
    /// Subject as type:id or type:id#relation
    subject: String,

    /// Caveat evaluation context as a JSON object
    #[arg(long)]
    caveat_context: Option<String>,

    /// Exit 1 when the permission is not granted
    #[arg(long)]
    error_on_no_permission: bool,

    /// Request and render the server's debug trace
    #[arg(long)]
    explain: bool,

    /// Emit the full response as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    consistency: ConsistencyFlags,
}

#[derive(Args)]
pub(crate) struct CheckBulkArgs {
    /// Checks as type:id#permission@type:id (repeatable)
    #[arg(required = true)]
    items: Vec<String>,

    /// Request and render the servers' debug traces as one document
    #[arg(long)]
    explain: bool,

    /// Emit the full response as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    consistency: ConsistencyFlags,
}

#[derive(Args)]
pub(crate) struct ExpandArgs {
    /// Resource as type:id
    resource: String,
    /// Permission or relation to expand
    permission: String,

    #[command(flatten)]
    consistency: ConsistencyFlags,
}

#[derive(Args)]
pub(crate) struct LookupResourcesArgs {
    /// Type of the resources to find
    resource_type: String,
    /// Permission the subject must hold
    permission: String,
    /// Subject as type:id or type:id#relation
    subject: String,

    /// Caveat evaluation context as a JSON object
    #[arg(long)]
    caveat_context: Option<String>,

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
pub(crate) struct LookupSubjectsArgs {
    /// Resource as type:id
    resource: String,
    /// Permission the subjects must hold
    permission: String,
    /// Type of the subjects to find
    subject_type: String,

    /// Relation on the found subjects
    #[arg(long)]
    subject_relation: Option<String>,

    #[command(flatten)]
    consistency: ConsistencyFlags,
}

pub(crate) async fn run(
    command: PermissionCommands,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let backend = connect(globals, &cancel).await?;
    match command {
        PermissionCommands::Check(args) => check(args, backend).await,
        PermissionCommands::CheckBulk(args) => check_bulk(args, backend).await,
        PermissionCommands::Expand(args) => expand(args, backend).await,
        PermissionCommands::LookupResources(args) => {
            lookup_resources(args, backend, cancel).await
        }
        PermissionCommands::LookupSubjects(args) => lookup_subjects(args, backend, cancel).await,
    }
}

fn parse_caveat_context(raw: Option<&str>) -> ZedResult<Option<prost_types::Struct>> {
    let Some(raw) = raw else { return Ok(None) };
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|err| ZedError::Validation(format!("invalid --caveat-context: {err}")))?;
    let serde_json::Value::Object(map) = value else {
        return Err(ZedError::Validation(
            "--caveat-context must be a JSON object".to_owned(),
        ));
    };
    Ok(Some(zed_core::context::json_to_struct(map)))
}

fn permissionship_word(value: i32) -> &'static str {
    match Permissionship::try_from(value) {
        Ok(Permissionship::HasPermission) => "true",
        Ok(Permissionship::ConditionalPermission) => "caveated",
        _ => "false",
    }
}

async fn check(args: CheckArgs, backend: Arc<dyn Backend>) -> ZedResult<u8> {
    let request = CheckPermissionRequest {
        consistency: Some(args.consistency.resolve()?),
        resource: Some(tuple::parse_object(&args.resource)?),
        permission: args.permission.clone(),
        subject: Some(tuple::parse_subject(&args.subject)?),
        context: parse_caveat_context(args.caveat_context.as_deref())?,
        with_tracing: args.explain,
    };

    let response = backend.check_permission(request).await?;

    if args.json {
        let doc = serde_json::json!({
            "permissionship": permissionship_word(response.permissionship),
            "checkedAt": response.checked_at.as_ref().map(|t| t.token.clone()),
            "missingContext": response
                .partial_caveat_info
                .as_ref()
                .map(|i| i.missing_required_context.clone()),
        });
        println!("{doc:#}");
    } else {
        println!("{}", permissionship_word(response.permissionship));
        if let Some(info) = &response.partial_caveat_info {
            eprintln!(
                "{}",
                Theme::dimmed(&format!(
                    "missing context: {}",
                    info.missing_required_context.join(", ")
                ))
            );
        }
    }

    if args.explain {
        match &response.debug_trace {
            Some(debug) => print!("{}", explain::render(debug)),
            None => eprintln!("{}", Theme::warning("the server returned no trace")),
        }
    }

    let granted = response.permissionship == Permissionship::HasPermission as i32;
    if args.error_on_no_permission && !granted {
        return Ok(1);
    }
    Ok(0)
}

async fn check_bulk(args: CheckBulkArgs, backend: Arc<dyn Backend>) -> ZedResult<u8> {
    let mut items = Vec::with_capacity(args.items.len());
    for raw in &args.items {
        let parsed = tuple::parse(raw)?;
        items.push(CheckBulkPermissionsRequestItem {
            resource: parsed.resource,
            permission: parsed.relation,
            subject: parsed.subject,
            context: parsed
                .optional_caveat
                .and_then(|c| c.context),
        });
    }

    let request = CheckBulkPermissionsRequest {
        consistency: Some(args.consistency.resolve()?),
        items,
        with_tracing: args.explain,
    };

    let response = backend.check_bulk_permissions(request).await?;

    if args.json {
        let pairs: Vec<serde_json::Value> = response
            .pairs
            .iter()
            .zip(&args.items)
            .map(|(pair, input)| match &pair.response {
                Some(PairResponse::Item(item)) => serde_json::json!({
                    "request": input,
                    "permissionship": permissionship_word(item.permissionship),
                }),
                Some(PairResponse::Error(status)) => serde_json::json!({
                    "request": input,
                    "error": status.message,
                }),
                None => serde_json::json!({ "request": input }),
            })
            .collect();
        println!("{:#}", serde_json::Value::Array(pairs));
        return Ok(0);
    }

    let mut traces = String::new();
    for (pair, input) in response.pairs.iter().zip(&args.items) {
        match &pair.response {
            Some(PairResponse::Item(item)) => {
                println!("{input} => {}", permissionship_word(item.permissionship));
                if let Some(debug) = &item.debug_trace {
                    traces.push_str(&explain::render(debug));
                }
            }
            Some(PairResponse::Error(status)) => {
                println!("{input} => error: {}", status.message);
            }
            None => println!("{input} => error: empty response"),
        }
    }
    if args.explain && !traces.is_empty() {
        print!("{traces}");
    }
    // Per-item failures do not fail the run.
    Ok(0)
}

async fn expand(args: ExpandArgs, backend: Arc<dyn Backend>) -> ZedResult<u8> {
    let request = ExpandPermissionTreeRequest {
        consistency: Some(args.consistency.resolve()?),
        resource: Some(tuple::parse_object(&args.resource)?),
        permission: args.permission.clone(),
    };

    let response = backend.expand_permission_tree(request).await?;
    match &response.tree_root {
        Some(tree) => {
            let mut out = String::new();
            render_tree(tree, 0, &mut out);
            print!("{out}");
        }
        None => println!("{}", Theme::dimmed("empty tree")),
    }
    Ok(0)
}

fn render_tree(tree: &PermissionRelationshipTree, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let expanded = tree
        .expanded_object
        .as_ref()
        .map(|o| format!("{}:{}#{}", o.object_type, o.object_id, tree.expanded_relation))
        .unwrap_or_else(|| tree.expanded_relation.clone());

    match &tree.tree_type {
        Some(TreeType::Intermediate(set)) => {
            let op = match algebraic_subject_set::Operation::try_from(set.operation) {
                Ok(algebraic_subject_set::Operation::Union) => "union",
                Ok(algebraic_subject_set::Operation::Intersection) => "intersection",
                Ok(algebraic_subject_set::Operation::Exclusion) => "exclusion",
                _ => "unknown",
            };
            out.push_str(&format!("{indent}{expanded} ({})\n", op.bold()));
            for child in &set.children {
                render_tree(child, depth + 1, out);
            }
        }
        Some(TreeType::Leaf(subjects)) => {
            out.push_str(&format!("{indent}{expanded}\n"));
            for subject in &subjects.subjects {
                if let Some(object) = &subject.object {
                    let relation = if subject.optional_relation.is_empty() {
                        String::new()
                    } else {
                        format!("#{}", subject.optional_relation)
                    };
                    out.push_str(&format!(
                        "{indent}  • {}:{}{relation}\n",
                        object.object_type, object.object_id
                    ));
                }
            }
        }
        None => out.push_str(&format!("{indent}{expanded}\n")),
    }
}

async fn lookup_resources(
    args: LookupResourcesArgs,
    backend: Arc<dyn Backend>,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let request = LookupResourcesRequest {
        consistency: Some(args.consistency.resolve()?),
        resource_object_type: args.resource_type.clone(),
        permission: args.permission.clone(),
        subject: Some(tuple::parse_subject(&args.subject)?),
        context: parse_caveat_context(args.caveat_context.as_deref())?,
        optional_limit: args.page_limit.unwrap_or(0),
        optional_cursor: args.cursor.clone().map(|token| Cursor { token }),
    };

    let mut stream = backend.lookup_resources(request).await?;
    let mut last_cursor: Option<String> = None;

    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return Err(ZedError::Cancelled),
            item = stream.next() => item,
        };
        match item {
            None => break,
            Some(Ok(found)) => {
                let marker = if found.permissionship
                    == LookupPermissionship::ConditionalPermission as i32
                {
                    Theme::dimmed(" (caveated)")
                } else {
                    String::new()
                };
                println!("{}:{}{marker}", args.resource_type, found.resource_object_id);
                last_cursor = found.after_result_cursor.map(|c| c.token);
            }
            Some(Err(status)) => return Err(status.into()),
        }
    }
    if let Some(cursor) = last_cursor {
        eprintln!("{}", Theme::dimmed(&format!("cursor: {cursor}")));
    }
    Ok(0)
}

async fn lookup_subjects(
    args: LookupSubjectsArgs,
    backend: Arc<dyn Backend>,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let request = LookupSubjectsRequest {
        consistency: Some(args.consistency.resolve()?),
        resource: Some(tuple::parse_object(&args.resource)?),
        permission: args.permission.clone(),
        subject_object_type: args.subject_type.clone(),
        optional_subject_relation: args.subject_relation.clone().unwrap_or_default(),
        context: None,
    };

    let mut stream = backend.lookup_subjects(request).await?;

    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return Err(ZedError::Cancelled),
            item = stream.next() => item,
        };
        match item {
            None => break,
            Some(Ok(found)) => {
                if let Some(subject) = &found.subject {
                    let marker = if subject.permissionship
                        == LookupPermissionship::ConditionalPermission as i32
                    {
                        Theme::dimmed(" (caveated)")
                    } else {
                        String::new()
                    };
                    println!("{}:{}{marker}", args.subject_type, subject.subject_object_id);
                }
            }
            Some(Err(status)) => return Err(status.into()),
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use zed_proto::rpc;
    use zed_proto::v1::{
        CheckBulkPermissionsPair, CheckBulkPermissionsResponse, CheckBulkPermissionsResponseItem,
        CheckDebugTrace, CheckPermissionResponse, DebugInformation, ZedToken,
    };
    use zed_test::MockBackend;

    use super::*;

    fn check_args(resource: &str, permission: &str, subject: &str) -> CheckArgs {
        CheckArgs {
            resource: resource.to_owned(),
            permission: permission.to_owned(),
            subject: subject.to_owned(),
            caveat_context: None,
            error_on_no_permission: false,
            explain: false,
            json: false,
            consistency: ConsistencyFlags::default(),
        }
    }

    fn granted_response(with_trace: bool) -> CheckPermissionResponse {
        CheckPermissionResponse {
            checked_at: Some(ZedToken {
                token: "tok".to_owned(),
            }),
            permissionship: Permissionship::HasPermission as i32,
            partial_caveat_info: None,
            debug_trace: with_trace.then(|| DebugInformation {
                check: Some(CheckDebugTrace {
                    resource: None,
                    permission: "viewer".to_owned(),
                    subject: None,
                    result: Permissionship::HasPermission as i32,
                    was_cached_result: false,
                    sub_problems: None,
                }),
                schema_used: String::new(),
            }),
        }
    }

    #[tokio::test]
    async fn a_granted_check_exits_zero() {
        let backend = Arc::new(MockBackend::new().with_check(Ok(granted_response(true))));
        let mut args = check_args("document:doc1", "viewer", "user:alice");
        args.explain = true;
        let code = check(args, backend).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn a_denied_check_exits_one_when_asked_to() {
        let denied = CheckPermissionResponse {
            checked_at: None,
            permissionship: Permissionship::NoPermission as i32,
            partial_caveat_info: None,
            debug_trace: None,
        };
        let backend = Arc::new(MockBackend::new().with_check(Ok(denied)));
        let mut args = check_args("document:doc1", "viewer", "user:alice");
        args.error_on_no_permission = true;
        let code = check(args, backend).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn bad_identifiers_fail_validation_before_any_rpc() {
        let backend = Arc::new(MockBackend::new());
        let err = check(check_args("notanobject", "viewer", "user:alice"), backend)
            .await
            .unwrap_err();
        assert!(matches!(err, ZedError::Validation(_)));
    }

    #[tokio::test]
    async fn bulk_check_reports_per_item_errors_without_failing() {
        let response = CheckBulkPermissionsResponse {
            checked_at: None,
            pairs: vec![
                CheckBulkPermissionsPair {
                    request: None,
                    response: Some(PairResponse::Item(CheckBulkPermissionsResponseItem {
                        permissionship: Permissionship::HasPermission as i32,
                        partial_caveat_info: None,
                        debug_trace: None,
                    })),
                },
                CheckBulkPermissionsPair {
                    request: None,
                    response: Some(PairResponse::Error(rpc::Status {
                        code: tonic::Code::FailedPrecondition as i32,
                        message: "cycle detected".to_owned(),
                        details: Vec::new(),
                    })),
                },
            ],
        };
        let backend = Arc::new(MockBackend::new().with_check_bulk(Ok(response)));
        let args = CheckBulkArgs {
            items: vec![
                "document:doc1#viewer@user:alice".to_owned(),
                "document:doc2#admin@user:bob".to_owned(),
            ],
            explain: false,
            json: false,
            consistency: ConsistencyFlags::default(),
        };
        let code = check_bulk(args, backend).await.unwrap();
        assert_eq!(code, 0);
    }
}
