//! Context resolution and backend construction for commands.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zed_client::Backend;
use zed_config::{ConfigStore, Token};
use zed_core::{ZedError, ZedResult};
use zed_secrets::SecretStore;

use crate::flags::GlobalArgs;

/// Opens the config store at the default location.
pub(crate) fn config_store() -> ZedResult<ConfigStore> {
    ConfigStore::new().map_err(|err| ZedError::Internal(err.to_string()))
}

/// Opens the secret backend for this host.
pub(crate) fn secret_store(store: &ConfigStore) -> ZedResult<Box<dyn SecretStore>> {
    Ok(zed_secrets::default_store(store.dir())?)
}

/// Resolves the current context + flags and dials the service.
pub(crate) async fn connect(
    globals: &GlobalArgs,
    cancel: &CancellationToken,
) -> ZedResult<Arc<dyn Backend>> {
    let store = config_store()?;
    let secrets = secret_store(&store)?;
    let token = zed_config::current_token(&globals.connection_flags(), &store, secrets.as_ref())?;
    connect_token(&token, globals, cancel).await
}

/// Resolves a *named* context (ignoring the current selection) and dials it.
pub(crate) async fn connect_context(
    name: &str,
    globals: &GlobalArgs,
    cancel: &CancellationToken,
) -> ZedResult<Arc<dyn Backend>> {
    let store = config_store()?;
    let secrets = secret_store(&store)?;
    let config = store.load()?;
    let stored = config.context(name).ok_or_else(|| {
        ZedError::Validation(format!("no context named \"{name}\""))
    })?;
    let mut token = stored.to_token();
    let secret = secrets.get(name)?;
    token.api_token = secret.api_token;
    if !secret.ca_cert.is_empty() {
        token.ca_cert = Some(secret.ca_cert);
    }
    if !token.any_value() {
        return Err(ZedError::ConfigMissing);
    }
    connect_token(&token, globals, cancel).await
}

async fn connect_token(
    token: &Token,
    globals: &GlobalArgs,
    cancel: &CancellationToken,
) -> ZedResult<Arc<dyn Backend>> {
    let backend =
        zed_client::connect(token, &globals.transport_options(), cancel.clone()).await?;
    Ok(Arc::new(backend))
}
