//! Streaming backup and restore for the permissions service.
//!
//! Three layers:
//!
//! - [`container`]: the on-disk format: a framed, snappy-compressed
//!   stream holding one schema record, the relationship records, and a
//!   metadata map with the last-known change token and resume cursor.
//! - [`rewrite`]: pure transforms applied between the wire and the
//!   container: prefix filtering, prefix replacement, legacy scrubbing,
//!   redaction. Composable as an ordered chain.
//! - [`export`] / [`import`]: the pipelines driving a
//!   [`zed_client::Backend`] against a container, with reconnection,
//!   batching, conflict handling, and a monotonic commit watermark.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod container;
pub mod export;
pub mod import;
pub mod redact;
pub mod rewrite;

pub use container::{ContainerReader, ContainerWriter, RewriteReader};
pub use export::{run_export, ExportOptions, ExportSummary};
pub use import::{run_import, ConflictPolicy, ImportOptions, ImportSummary, SchemaPolicy};
pub use redact::{RedactionMap, Redactor};
pub use rewrite::{
    ChainRewriter, LegacyRewriter, NoopRewriter, PrefixFilter, PrefixReplacer, RewriteOutcome,
    Rewriter,
};
