//! Shared test support for the zed workspace.
//!
//! Provides [`MockBackend`], a programmable fake of the permission-service
//! capability set, plus small fixture helpers. Use as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! zed-test = { workspace = true }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod backend;
pub mod fixtures;

pub use backend::MockBackend;
pub use fixtures::{rel, sample_schema};
