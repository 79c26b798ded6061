//! Core vocabulary for the zed CLI.
//!
//! This crate carries the pieces every other crate speaks in: identifier
//! parsing and canonical formatting, consistency-mode selection, the error
//! taxonomy with its exit-code mapping, and config-directory resolution.
//! It deliberately has no I/O beyond reading environment variables.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod consistency;
pub mod context;
pub mod dirs;
pub mod error;
pub mod tuple;

pub use consistency::ConsistencyArgs;
pub use error::{ZedError, ZedResult};
