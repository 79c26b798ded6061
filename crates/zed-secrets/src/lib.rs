//! Per-context secret storage.
//!
//! Secrets (the API token and optional CA material of a context) never land
//! in `config.json`. They live behind the [`SecretStore`] trait with two
//! backends:
//!
//! - [`KeychainStore`]: one OS keychain item per context under the `zed`
//!   service identifier. The default.
//! - [`SealedFileStore`]: an AEAD-sealed file in the config directory for
//!   hosts without a usable keychain; the sealing key itself is kept in the
//!   keychain under a reserved account.
//!
//! `get` on a missing entry returns the zero secret; only `put` creates
//! state.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod file;
mod keychain;

use std::path::Path;

pub use error::{SecretError, SecretResult};
pub use file::SealedFileStore;
pub use keychain::KeychainStore;

/// Keychain service identifier all zed entries live under.
pub const SERVICE_NAME: &str = "zed";

/// The secret half of a context: splice targets for the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secret {
    /// Opaque bearer token presented to the permissions service.
    pub api_token: String,
    /// PEM bytes of a custom certificate authority, empty when unset.
    pub ca_cert: Vec<u8>,
}

impl Secret {
    /// True when neither field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.api_token.is_empty() && self.ca_cert.is_empty()
    }
}

/// Abstract per-context secret storage.
pub trait SecretStore: Send + Sync {
    /// Reads the secret for `context_name`.
    ///
    /// A missing entry is not an error; the zero [`Secret`] is returned.
    fn get(&self, context_name: &str) -> SecretResult<Secret>;

    /// Writes the secret for `context_name`, creating backend state as
    /// needed. Atomic with respect to concurrent readers.
    fn put(&self, context_name: &str, secret: &Secret) -> SecretResult<()>;

    /// Removes the secret for `context_name`. Missing entries are ignored.
    fn delete(&self, context_name: &str) -> SecretResult<()>;
}

/// Selects the backend for this host.
///
/// The keychain is the default; a probe at selection time catches hosts
/// where it cannot serve this process (no daemon, locked keyring) and
/// falls back to the sealed-file backend in `config_dir`.
/// `ZED_KEYRING=file` forces the sealed-file backend, which keeps a single
/// keychain item (the sealing key) instead of one per context. The file
/// backend still refuses to open when its sealing key cannot be served; it
/// never degrades to plaintext.
pub fn default_store(config_dir: &Path) -> SecretResult<Box<dyn SecretStore>> {
    if std::env::var_os("ZED_KEYRING").is_some_and(|v| v == "file") {
        tracing::debug!("using sealed file secret backend");
        return Ok(Box::new(SealedFileStore::open(config_dir)?));
    }
    let keychain = KeychainStore::new();
    match keychain.probe() {
        Ok(()) => Ok(Box::new(keychain)),
        Err(err) => {
            tracing::debug!(error = %err, "keychain unavailable, falling back to sealed file backend");
            Ok(Box::new(SealedFileStore::open(config_dir)?))
        }
    }
}
