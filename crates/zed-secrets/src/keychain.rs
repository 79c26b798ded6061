//! OS keychain backend.
//!
//! Each context stores one keychain item under service [`SERVICE_NAME`] and
//! the context name as the account. Both secret fields fit one item via a
//! length-prefixed concatenation: `u32-le len ‖ api_token ‖ u32-le len ‖
//! ca_cert`. The OS serializes concurrent access.

use keyring::Entry;

use crate::error::{SecretError, SecretResult};
use crate::{Secret, SecretStore, SERVICE_NAME};

/// Account name used only to probe keychain availability.
const PROBE_ACCOUNT: &str = "__zed-probe__";

/// Secret store backed by the platform keychain.
#[derive(Debug, Default)]
pub struct KeychainStore {
    _private: (),
}

impl KeychainStore {
    /// Creates the backend. No keychain access happens until first use.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Checks that the keychain can serve this process at all.
    ///
    /// A missing probe entry is the healthy outcome; any other failure
    /// (no daemon, locked keyring, headless host) means the keychain is
    /// unusable and callers should pick another backend.
    pub fn probe(&self) -> SecretResult<()> {
        let entry = entry_for(PROBE_ACCOUNT)?;
        match entry.get_secret() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(SecretError::Unavailable(err.to_string())),
        }
    }
}

impl SecretStore for KeychainStore {
    fn get(&self, context_name: &str) -> SecretResult<Secret> {
        let entry = entry_for(context_name)?;
        match entry.get_secret() {
            Ok(blob) => decode_blob(&blob),
            Err(keyring::Error::NoEntry) => Ok(Secret::default()),
            Err(err) => Err(SecretError::Unavailable(err.to_string())),
        }
    }

    fn put(&self, context_name: &str, secret: &Secret) -> SecretResult<()> {
        let entry = entry_for(context_name)?;
        entry
            .set_secret(&encode_blob(secret))
            .map_err(|err| SecretError::Unavailable(err.to_string()))
    }

    fn delete(&self, context_name: &str) -> SecretResult<()> {
        let entry = entry_for(context_name)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(SecretError::Unavailable(err.to_string())),
        }
    }
}

fn entry_for(account: &str) -> SecretResult<Entry> {
    Entry::new(SERVICE_NAME, account).map_err(|err| SecretError::Unavailable(err.to_string()))
}

fn encode_blob(secret: &Secret) -> Vec<u8> {
    let token = secret.api_token.as_bytes();
    let mut blob = Vec::with_capacity(8 + token.len() + secret.ca_cert.len());
    blob.extend_from_slice(&u32::try_from(token.len()).unwrap_or(u32::MAX).to_le_bytes());
    blob.extend_from_slice(token);
    blob.extend_from_slice(
        &u32::try_from(secret.ca_cert.len())
            .unwrap_or(u32::MAX)
            .to_le_bytes(),
    );
    blob.extend_from_slice(&secret.ca_cert);
    blob
}

fn decode_blob(blob: &[u8]) -> SecretResult<Secret> {
    let (token, rest) = read_chunk(blob)?;
    let (ca_cert, rest) = read_chunk(rest)?;
    if !rest.is_empty() {
        return Err(SecretError::Corrupt("trailing bytes in keychain item".into()));
    }
    Ok(Secret {
        api_token: String::from_utf8(token.to_vec())
            .map_err(|_| SecretError::Corrupt("api token is not UTF-8".into()))?,
        ca_cert: ca_cert.to_vec(),
    })
}

fn read_chunk(buf: &[u8]) -> SecretResult<(&[u8], &[u8])> {
    if buf.len() < 4 {
        return Err(SecretError::Corrupt("truncated length prefix".into()));
    }
    let (len_bytes, rest) = buf.split_at(4);
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if rest.len() < len {
        return Err(SecretError::Corrupt("truncated keychain item".into()));
    }
    Ok(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_encoding_round_trips() {
        let secret = Secret {
            api_token: "tc_zed_abc123".to_owned(),
            ca_cert: b"-----BEGIN CERTIFICATE-----".to_vec(),
        };
        assert_eq!(decode_blob(&encode_blob(&secret)).unwrap(), secret);
    }

    #[test]
    fn zero_secret_round_trips() {
        let secret = Secret::default();
        assert_eq!(decode_blob(&encode_blob(&secret)).unwrap(), secret);
    }

    #[test]
    fn truncated_blobs_are_rejected() {
        assert!(matches!(
            decode_blob(&[1, 0, 0]),
            Err(SecretError::Corrupt(_))
        ));
        assert!(matches!(
            decode_blob(&[5, 0, 0, 0, b'a']),
            Err(SecretError::Corrupt(_))
        ));
    }
}
