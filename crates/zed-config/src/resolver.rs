//! Joining flags, the selected context, and secrets into one [`Token`].

use std::path::PathBuf;

use tracing::debug;
use zed_core::{ZedError, ZedResult};
use zed_secrets::SecretStore;

use crate::store::ConfigStore;
use crate::token::Token;

/// Environment variable consulted when neither flag nor context carries a
/// bearer token.
const TOKEN_ENV: &str = "ZED_TOKEN";

/// The connection-relevant command-line flags.
///
/// Every field is `None`/absent unless the user typed the flag, which is
/// what lets a defaulted flag lose to a stored context value.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFlags {
    /// `--endpoint host:port`.
    pub endpoint: Option<String>,
    /// `--token <bearer>`.
    pub token: Option<String>,
    /// `--certificate-path <pem>`; read lazily, only when provided.
    pub certificate_path: Option<PathBuf>,
    /// `--insecure`.
    pub insecure: Option<bool>,
    /// `--no-verify-ca`.
    pub no_verify_ca: Option<bool>,
}

impl ConnectionFlags {
    fn to_overlay(&self) -> ZedResult<Token> {
        let ca_cert = match &self.certificate_path {
            Some(path) => Some(std::fs::read(path).map_err(|err| {
                ZedError::Validation(format!(
                    "cannot read certificate at {}: {err}",
                    path.display()
                ))
            })?),
            None => None,
        };
        Ok(Token {
            name: String::new(),
            endpoint: self.endpoint.clone().unwrap_or_default(),
            api_token: self.token.clone().unwrap_or_default(),
            ca_cert,
            insecure: self.insecure,
            no_verify_ca: self.no_verify_ca,
        })
    }
}

/// Resolves the token the current command should dial with.
///
/// Precedence per field: flag-changed > stored context > default. The
/// `ZED_TOKEN` environment variable supplies the bearer only when neither a
/// flag nor the context did.
///
/// # Errors
///
/// [`ZedError::ConfigMissing`] when the merge produces an empty token.
pub fn current_token(
    flags: &ConnectionFlags,
    store: &ConfigStore,
    secrets: &dyn SecretStore,
) -> ZedResult<Token> {
    let config = store.load()?;

    let mut token = match config.current() {
        Some(stored) => {
            let mut token = stored.to_token();
            let secret = secrets.get(&stored.name)?;
            token.api_token = secret.api_token;
            if !secret.ca_cert.is_empty() {
                token.ca_cert = Some(secret.ca_cert);
            }
            token
        }
        None => Token::default(),
    };

    token = token.with_override(&flags.to_overlay()?);

    if token.api_token.is_empty() {
        if let Ok(env_token) = std::env::var(TOKEN_ENV) {
            if !env_token.is_empty() {
                debug!("using bearer token from {TOKEN_ENV}");
                token.api_token = env_token;
            }
        }
    }

    if !token.any_value() {
        return Err(ZedError::ConfigMissing);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use zed_secrets::{Secret, SecretResult};

    use super::*;
    use crate::store::{ContextConfig, StoredContext};

    struct MapSecrets {
        entries: Mutex<std::collections::HashMap<String, Secret>>,
    }

    impl MapSecrets {
        fn with(name: &str, secret: Secret) -> Self {
            let mut entries = std::collections::HashMap::new();
            entries.insert(name.to_owned(), secret);
            Self {
                entries: Mutex::new(entries),
            }
        }
    }

    impl SecretStore for MapSecrets {
        fn get(&self, context_name: &str) -> SecretResult<Secret> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(context_name)
                .cloned()
                .unwrap_or_default())
        }

        fn put(&self, context_name: &str, secret: &Secret) -> SecretResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(context_name.to_owned(), secret.clone());
            Ok(())
        }

        fn delete(&self, context_name: &str) -> SecretResult<()> {
            self.entries.lock().unwrap().remove(context_name);
            Ok(())
        }
    }

    fn store_with_staging(dir: &std::path::Path) -> ConfigStore {
        let store = ConfigStore::at(dir.join("zed"));
        store
            .save(&ContextConfig {
                current_context: "staging".to_owned(),
                contexts: vec![StoredContext {
                    name: "staging".to_owned(),
                    endpoint: "grpc.staging.example.com:443".to_owned(),
                    insecure: Some(false),
                    no_verify_ca: None,
                    extra: serde_json::Map::new(),
                }],
                extra: serde_json::Map::new(),
            })
            .unwrap();
        store
    }

    #[test]
    fn context_supplies_endpoint_and_secret() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_staging(tmp.path());
        let secrets = MapSecrets::with(
            "staging",
            Secret {
                api_token: "tc_zed_staging".to_owned(),
                ca_cert: Vec::new(),
            },
        );
        let token = current_token(&ConnectionFlags::default(), &store, &secrets).unwrap();
        assert_eq!(token.name, "staging");
        assert_eq!(token.endpoint, "grpc.staging.example.com:443");
        assert_eq!(token.api_token, "tc_zed_staging");
    }

    #[test]
    fn changed_flags_beat_the_context() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_staging(tmp.path());
        let secrets = MapSecrets::with(
            "staging",
            Secret {
                api_token: "tc_zed_staging".to_owned(),
                ca_cert: Vec::new(),
            },
        );
        let flags = ConnectionFlags {
            endpoint: Some("localhost:50051".to_owned()),
            insecure: Some(true),
            ..ConnectionFlags::default()
        };
        let token = current_token(&flags, &store, &secrets).unwrap();
        assert_eq!(token.endpoint, "localhost:50051");
        assert_eq!(token.insecure, Some(true));
        // The flag did not touch the token, so the context's survives.
        assert_eq!(token.api_token, "tc_zed_staging");
    }

    #[test]
    fn unchanged_bool_flags_never_shadow_the_context() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_staging(tmp.path());
        let secrets = MapSecrets::with("staging", Secret::default());
        let token = current_token(&ConnectionFlags::default(), &store, &secrets).unwrap();
        // The context said `insecure: false`; an absent flag must not erase it.
        assert_eq!(token.insecure, Some(false));
    }

    #[test]
    fn empty_merge_is_config_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(tmp.path().join("zed"));
        let secrets = MapSecrets::with("unused", Secret::default());
        let err = current_token(&ConnectionFlags::default(), &store, &secrets).unwrap_err();
        assert!(matches!(err, ZedError::ConfigMissing));
    }

    #[test]
    fn certificate_path_is_read_only_when_provided() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_staging(tmp.path());
        let secrets = MapSecrets::with("staging", Secret::default());
        let pem = tmp.path().join("ca.pem");
        std::fs::write(&pem, b"-----BEGIN CERTIFICATE-----").unwrap();
        let flags = ConnectionFlags {
            certificate_path: Some(pem),
            ..ConnectionFlags::default()
        };
        let token = current_token(&flags, &store, &secrets).unwrap();
        assert_eq!(
            token.ca_cert.as_deref(),
            Some(b"-----BEGIN CERTIFICATE-----".as_slice())
        );

        let missing = ConnectionFlags {
            certificate_path: Some(tmp.path().join("nope.pem")),
            ..ConnectionFlags::default()
        };
        assert!(current_token(&missing, &store, &secrets).is_err());
    }
}
