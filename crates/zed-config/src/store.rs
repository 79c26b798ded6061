//! Atomic persistence of the non-secret context registry.
//!
//! `config.json` holds the current selection and one entry per context,
//! minus secrets. Saves go through the write-temp → fsync → rename dance so
//! a crash leaves either the old or the new document, never a torn one.
//! Fields this version does not know are captured and written back.

use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigResult;
use crate::token::Token;

/// File name of the registry inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// One persisted context, minus its secrets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContext {
    /// Unique context name.
    pub name: String,
    /// `host:port` of the permissions service.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    /// Dial without TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    /// Dial with TLS but skip certificate verification.
    #[serde(
        rename = "noVerifyCA",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub no_verify_ca: Option<bool>,
    /// Fields written by newer versions; preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredContext {
    /// The non-secret part of this context as a [`Token`].
    #[must_use]
    pub fn to_token(&self) -> Token {
        Token {
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            api_token: String::new(),
            ca_cert: None,
            insecure: self.insecure,
            no_verify_ca: self.no_verify_ca,
        }
    }
}

/// The persisted registry document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    /// Name of the selected context; empty when none is selected.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_context: String,
    /// All known contexts, in insertion order. Names are unique.
    #[serde(default)]
    pub contexts: Vec<StoredContext>,
    /// Fields written by newer versions; preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContextConfig {
    /// Looks up a context by name.
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&StoredContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// The currently selected context, when one is selected and exists.
    #[must_use]
    pub fn current(&self) -> Option<&StoredContext> {
        if self.current_context.is_empty() {
            None
        } else {
            self.context(&self.current_context)
        }
    }

    /// Inserts or replaces a context by name.
    pub fn upsert(&mut self, context: StoredContext) {
        match self.contexts.iter_mut().find(|c| c.name == context.name) {
            Some(slot) => *slot = context,
            None => self.contexts.push(context),
        }
    }

    /// Removes a context by name; returns whether it existed. Clears the
    /// selection when it pointed at the removed context.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.contexts.len();
        self.contexts.retain(|c| c.name != name);
        if self.current_context == name {
            self.current_context.clear();
        }
        self.contexts.len() != before
    }
}

/// Loads and saves [`ContextConfig`] documents.
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// A store rooted at the default config directory.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: zed_core::dirs::config_dir()?,
        })
    }

    /// A store rooted at an explicit directory (used by tests).
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store persists into.
    #[must_use]
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Reads the registry; a missing file is an empty registry.
    pub fn load(&self) -> ConfigResult<ContextConfig> {
        let path = self.dir.join(CONFIG_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, starting empty");
                Ok(ContextConfig::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the registry atomically with user-only permissions.
    pub fn save(&self, config: &ContextConfig) -> ConfigResult<()> {
        zed_core::dirs::ensure_private_dir(&self.dir)?;
        let path = self.dir.join(CONFIG_FILE);
        let tmp_path = self.dir.join(format!(".{CONFIG_FILE}.tmp"));
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tmp.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            tmp.write_all(&serde_json::to_vec_pretty(config)?)?;
            tmp.write_all(b"\n")?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        debug!(path = %path.display(), contexts = config.contexts.len(), "saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContextConfig {
        ContextConfig {
            current_context: "staging".to_owned(),
            contexts: vec![
                StoredContext {
                    name: "staging".to_owned(),
                    endpoint: "grpc.staging.example.com:443".to_owned(),
                    insecure: None,
                    no_verify_ca: None,
                    extra: serde_json::Map::new(),
                },
                StoredContext {
                    name: "dev".to_owned(),
                    endpoint: "localhost:50051".to_owned(),
                    insecure: Some(true),
                    no_verify_ca: None,
                    extra: serde_json::Map::new(),
                },
            ],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(tmp.path());
        assert_eq!(store.load().unwrap(), ContextConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(tmp.path().join("zed"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("zed");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(CONFIG_FILE),
            r#"{"currentContext":"dev","contexts":[{"name":"dev","endpoint":"localhost:50051","futureKnob":7}],"futureSection":{"a":1}}"#,
        )
        .unwrap();
        let store = ConfigStore::at(&dir);
        let mut config = store.load().unwrap();
        config.current_context = "dev".to_owned();
        store.save(&config).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join(CONFIG_FILE)).unwrap()).unwrap();
        assert_eq!(raw["futureSection"]["a"], 1);
        assert_eq!(raw["contexts"][0]["futureKnob"], 7);
    }

    #[test]
    fn field_names_are_stable() {
        let mut config = sample();
        config.contexts[1].no_verify_ca = Some(true);
        let json = serde_json::to_value(config).unwrap();
        assert!(json.get("currentContext").is_some());
        assert_eq!(json["contexts"][1]["insecure"], true);
        assert_eq!(json["contexts"][1]["noVerifyCA"], true);
        assert!(json["contexts"][0].get("insecure").is_none());
    }

    #[test]
    fn remove_clears_a_dangling_selection() {
        let mut config = sample();
        assert!(config.remove("staging"));
        assert!(config.current_context.is_empty());
        assert!(!config.remove("staging"));
        assert_eq!(config.contexts.len(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn config_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(tmp.path().join("zed"));
        store.save(&sample()).unwrap();
        let mode = std::fs::metadata(tmp.path().join("zed").join(CONFIG_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
