//! AEAD-sealed file backend.
//!
//! The whole secret map lives in one `secrets.bin` file:
//! 24-byte XChaCha20-Poly1305 nonce followed by the sealed JSON map
//! `name → {api_token, ca_cert(base64)}`. The 32-byte sealing key is kept in
//! the keychain under a reserved account; if that key cannot be served the
//! backend refuses to open. Writers take an exclusive advisory lock and
//! replace the file atomically; readers take a shared lock.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use fs2::FileExt;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{SecretError, SecretResult};
use crate::{Secret, SecretStore, SERVICE_NAME};

/// Reserved keychain account holding the sealing key.
const KEY_ACCOUNT: &str = "__zed-sealing-key__";
/// Sealed payload file name inside the config directory.
const FILE_NAME: &str = "secrets.bin";
/// Sibling lock file name.
const LOCK_NAME: &str = "secrets.lock";
/// XChaCha20-Poly1305 nonce length.
const NONCE_LEN: usize = 24;

#[derive(Serialize, Deserialize)]
struct StoredSecret {
    api_token: String,
    ca_cert: String,
}

/// How the sealing key is obtained; swapped out in tests.
trait KeySource: Send + Sync {
    /// Reads the key, `None` when it does not exist yet.
    fn load(&self) -> SecretResult<Option<Zeroizing<Vec<u8>>>>;
    /// Persists a freshly generated key.
    fn store(&self, key: &[u8]) -> SecretResult<()>;
}

struct KeychainKeySource;

impl KeySource for KeychainKeySource {
    fn load(&self) -> SecretResult<Option<Zeroizing<Vec<u8>>>> {
        let entry = key_entry()?;
        match entry.get_secret() {
            Ok(key) => Ok(Some(Zeroizing::new(key))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(SecretError::Unavailable(err.to_string())),
        }
    }

    fn store(&self, key: &[u8]) -> SecretResult<()> {
        key_entry()?
            .set_secret(key)
            .map_err(|err| SecretError::Unavailable(err.to_string()))
    }
}

fn key_entry() -> SecretResult<Entry> {
    Entry::new(SERVICE_NAME, KEY_ACCOUNT)
        .map_err(|err| SecretError::Unavailable(err.to_string()))
}

/// Secret store backed by an AEAD-sealed file.
pub struct SealedFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    key_source: Box<dyn KeySource>,
}

impl SealedFileStore {
    /// Opens the backend rooted at `config_dir`.
    ///
    /// Verifies the keychain can serve the sealing key; a keychain failure
    /// here is [`SecretError::Unavailable`]. A key that does not exist yet
    /// is fine; it is generated by the first `put`.
    pub fn open(config_dir: &Path) -> SecretResult<Self> {
        let store = Self {
            path: config_dir.join(FILE_NAME),
            lock_path: config_dir.join(LOCK_NAME),
            key_source: Box::new(KeychainKeySource),
        };
        // Fail now rather than on first use.
        store.key_source.load()?;
        Ok(store)
    }

    #[cfg(test)]
    fn with_key_source(config_dir: &Path, key_source: Box<dyn KeySource>) -> Self {
        Self {
            path: config_dir.join(FILE_NAME),
            lock_path: config_dir.join(LOCK_NAME),
            key_source,
        }
    }

    fn lock_file(&self) -> SecretResult<std::fs::File> {
        if let Some(parent) = self.lock_path.parent() {
            zed_core::dirs::ensure_private_dir(parent)?;
        }
        Ok(std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?)
    }

    fn load_map(&self, key: Option<&[u8]>) -> SecretResult<HashMap<String, StoredSecret>> {
        let sealed = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(err) => return Err(err.into()),
        };
        let Some(key) = key else {
            return Err(SecretError::Corrupt(
                "secrets file exists but the sealing key is gone".into(),
            ));
        };
        if sealed.len() < NONCE_LEN {
            return Err(SecretError::Corrupt("secrets file is truncated".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|err| SecretError::Seal(err.to_string()))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(XNonce::from_slice(nonce), ciphertext)
                .map_err(|_| SecretError::Seal("unsealing failed (wrong key or damage)".into()))?,
        );
        serde_json::from_slice(&plaintext)
            .map_err(|err| SecretError::Corrupt(err.to_string()))
    }

    fn save_map(&self, key: &[u8], map: &HashMap<String, StoredSecret>) -> SecretResult<()> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(map).map_err(|err| SecretError::Corrupt(err.to_string()))?,
        );
        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|err| SecretError::Seal(err.to_string()))?;
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| SecretError::Seal("sealing failed".into()))?;

        let tmp_path = self.path.with_extension("bin.tmp");
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tmp.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            tmp.write_all(&nonce)?;
            tmp.write_all(&ciphertext)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl SecretStore for SealedFileStore {
    fn get(&self, context_name: &str) -> SecretResult<Secret> {
        let lock = self.lock_file()?;
        lock.lock_shared()?;
        let result = (|| {
            let key = self.key_source.load()?;
            let map = self.load_map(key.as_deref().map(Vec::as_slice))?;
            let Some(stored) = map.get(context_name) else {
                return Ok(Secret::default());
            };
            Ok(Secret {
                api_token: stored.api_token.clone(),
                ca_cert: base64::engine::general_purpose::STANDARD
                    .decode(&stored.ca_cert)
                    .map_err(|err| SecretError::Corrupt(err.to_string()))?,
            })
        })();
        let _ = lock.unlock();
        result
    }

    fn put(&self, context_name: &str, secret: &Secret) -> SecretResult<()> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let result = (|| {
            let key = match self.key_source.load()? {
                Some(key) => key,
                None => {
                    let key = Zeroizing::new(
                        XChaCha20Poly1305::generate_key(&mut OsRng).to_vec(),
                    );
                    self.key_source.store(&key)?;
                    key
                }
            };
            let mut map = self.load_map(Some(key.as_slice()))?;
            map.insert(
                context_name.to_owned(),
                StoredSecret {
                    api_token: secret.api_token.clone(),
                    ca_cert: base64::engine::general_purpose::STANDARD.encode(&secret.ca_cert),
                },
            );
            self.save_map(&key, &map)
        })();
        let _ = lock.unlock();
        result
    }

    fn delete(&self, context_name: &str) -> SecretResult<()> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let result = (|| {
            let Some(key) = self.key_source.load()? else {
                return Ok(());
            };
            let mut map = self.load_map(Some(key.as_slice()))?;
            if map.remove(context_name).is_some() {
                self.save_map(&key, &map)?;
            }
            Ok(())
        })();
        let _ = lock.unlock();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// In-memory key source so tests never touch a real keychain.
    struct MemoryKeySource {
        key: Mutex<Option<Vec<u8>>>,
    }

    impl MemoryKeySource {
        fn empty() -> Self {
            Self {
                key: Mutex::new(None),
            }
        }
    }

    impl KeySource for MemoryKeySource {
        fn load(&self) -> SecretResult<Option<Zeroizing<Vec<u8>>>> {
            Ok(self.key.lock().unwrap().clone().map(Zeroizing::new))
        }

        fn store(&self, key: &[u8]) -> SecretResult<()> {
            *self.key.lock().unwrap() = Some(key.to_vec());
            Ok(())
        }
    }

    fn store_in(dir: &Path) -> SealedFileStore {
        SealedFileStore::with_key_source(dir, Box::new(MemoryKeySource::empty()))
    }

    #[test]
    fn missing_entry_yields_the_zero_secret() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        assert_eq!(store.get("staging").unwrap(), Secret::default());
    }

    #[test]
    fn put_then_get_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let secret = Secret {
            api_token: "tc_zed_123".to_owned(),
            ca_cert: b"PEM".to_vec(),
        };
        store.put("staging", &secret).unwrap();
        assert_eq!(store.get("staging").unwrap(), secret);
        // Other entries stay untouched.
        assert_eq!(store.get("prod").unwrap(), Secret::default());
    }

    #[test]
    fn delete_removes_only_the_named_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let secret = Secret {
            api_token: "a".to_owned(),
            ca_cert: Vec::new(),
        };
        store.put("one", &secret).unwrap();
        store.put("two", &secret).unwrap();
        store.delete("one").unwrap();
        assert_eq!(store.get("one").unwrap(), Secret::default());
        assert_eq!(store.get("two").unwrap(), secret);
    }

    #[test]
    fn sealed_file_is_not_plaintext() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store
            .put(
                "staging",
                &Secret {
                    api_token: "supersecrettoken".to_owned(),
                    ca_cert: Vec::new(),
                },
            )
            .unwrap();
        let raw = std::fs::read(tmp.path().join(FILE_NAME)).unwrap();
        let haystack = String::from_utf8_lossy(&raw);
        assert!(!haystack.contains("supersecrettoken"));
    }

    #[test]
    fn file_without_key_is_reported_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        store
            .put(
                "staging",
                &Secret {
                    api_token: "t".to_owned(),
                    ca_cert: Vec::new(),
                },
            )
            .unwrap();
        // Simulate a lost keychain entry.
        let fresh = store_in(tmp.path());
        assert!(matches!(
            fresh.get("staging"),
            Err(SecretError::Corrupt(_))
        ));
    }
}
