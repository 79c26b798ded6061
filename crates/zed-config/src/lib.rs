//! Context registry for the zed CLI.
//!
//! A *context* is a named connection descriptor: endpoint, credentials, and
//! TLS posture. The non-secret half persists in `config.json`; the secret
//! half lives behind `zed-secrets`. The [`resolver`] joins both with
//! command-line flags under the precedence **flag-changed > stored >
//! default** to produce the fully specified [`Token`] the transport builder
//! consumes.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
pub mod resolver;
pub mod store;
pub mod token;

pub use error::{ConfigError, ConfigResult};
pub use resolver::{current_token, ConnectionFlags};
pub use store::{ConfigStore, ContextConfig, StoredContext};
pub use token::Token;
