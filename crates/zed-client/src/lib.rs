//! Transport construction and retry policy.
//!
//! Turns a resolved [`zed_config::Token`] plus command-line transport flags
//! into a connected [`Backend`]: TLS mode selection, optional HTTP-proxy
//! dialing, bearer metadata, keepalive and message-size limits, per-method
//! retry with jittered exponential backoff, and the version handshake.
//!
//! The rest of the CLI talks only to the [`Backend`] trait; tests substitute
//! a fake without touching any of the machinery here.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod backend;
mod builder;
mod connector;
mod metadata;
pub mod retry;
mod tls;
mod version;

pub use backend::{Backend, BoxedResponseStream, GrpcBackend};
pub use builder::{connect, TransportOptions};
pub use metadata::CallMetadata;
pub use retry::{MethodPolicy, RetryPolicy};
pub use tls::TlsMode;
