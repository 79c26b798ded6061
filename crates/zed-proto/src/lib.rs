//! Hand-maintained mirror of the permissions service wire protocol.
//!
//! The service speaks a fixed gRPC API (`authzed.api.v1`). This crate mirrors
//! the messages the CLI consumes with `prost` derives and exposes concrete
//! clients over a [`tonic::transport::Channel`], matching the shapes the
//! protobuf toolchain would generate. Keeping the mirror by hand avoids a
//! protoc requirement at build time; field numbers follow the published
//! protocol and must not be reordered.
//!
//! Layout:
//! - [`v1`]: request/response messages and supporting types.
//! - [`rpc`]: `google.rpc` status/error-detail mirrors and extraction
//!   helpers for structured server errors.
//! - [`client`]: one client struct per service: schema, permissions,
//!   watch, experimental.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod rpc;
pub mod v1;

pub use client::{
    ExperimentalServiceClient, PermissionsServiceClient, SchemaServiceClient, WatchServiceClient,
};
pub use rpc::{error_info_from_status, ErrorInfo};
