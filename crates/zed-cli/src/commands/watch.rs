//! Watch command: stream committed changes until interrupted.


use clap::Args;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use zed_core::{tuple, ZedError, ZedResult};
use zed_proto::v1::relationship_update::Operation;
use zed_proto::v1::{RelationshipFilter, WatchRequest, ZedToken};

use crate::client::connect;
use crate::flags::GlobalArgs;

#[derive(Args)]
pub(crate) struct WatchArgs {
    /// Restrict updates to these object types (comma separated)
    #[arg(long = "object_types", value_delimiter = ',')]
    object_types: Vec<String>,

    /// Restrict updates to relationships matching type or type:id
    /// (repeatable)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Start from this change token instead of now
    #[arg(long)]
    revision: Option<String>,

    /// Prefix every line with the arrival timestamp
    #[arg(long)]
    timestamp: bool,
}

pub(crate) async fn run(
    args: WatchArgs,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let mut relationship_filters = Vec::with_capacity(args.filters.len());
    for raw in &args.filters {
        let (resource_type, resource_id) = match raw.split_once(':') {
            Some((t, id)) => (t.to_owned(), id.to_owned()),
            None => (raw.clone(), String::new()),
        };
        if resource_type.is_empty() {
            return Err(ZedError::Validation(format!("invalid --filter \"{raw}\"")));
        }
        relationship_filters.push(RelationshipFilter {
            resource_type,
            optional_resource_id: resource_id,
            optional_relation: String::new(),
            optional_subject_filter: None,
            optional_resource_id_prefix: String::new(),
        });
    }

    let request = WatchRequest {
        optional_object_types: args.object_types.clone(),
        optional_start_cursor: args.revision.clone().map(|token| ZedToken { token }),
        optional_relationship_filters: relationship_filters,
    };

    let backend = connect(globals, &cancel).await?;
    let mut stream = backend.watch(request).await?;

    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return Err(ZedError::Cancelled),
            item = stream.next() => item,
        };
        match item {
            None => return Ok(0),
            Some(Ok(batch)) => {
                let stamp = if args.timestamp {
                    format!(
                        "{} ",
                        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                    )
                } else {
                    String::new()
                };
                for update in &batch.updates {
                    let verb = match Operation::try_from(update.operation) {
                        Ok(Operation::Create) => "CREATED",
                        Ok(Operation::Touch) => "TOUCHED",
                        Ok(Operation::Delete) => "DELETED",
                        _ => "UNKNOWN",
                    };
                    if let Some(rel) = &update.relationship {
                        println!("{stamp}{verb} {}", tuple::format(rel));
                    }
                }
            }
            Some(Err(status)) => return Err(status.into()),
        }
    }
}
