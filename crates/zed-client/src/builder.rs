//! Channel construction from a resolved token plus transport flags.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio_util::sync::CancellationToken;
use tonic::transport::Endpoint;
use tracing::debug;
use zed_config::Token;
use zed_core::{ZedError, ZedResult};

use crate::backend::GrpcBackend;
use crate::connector::{self, DialPlan};
use crate::metadata::CallMetadata;
use crate::retry::RetryPolicy;
use crate::tls::TlsMode;
use crate::version;

/// Default maximum gRPC message size: 4 MiB.
const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
/// Port assumed when the endpoint does not name one.
const DEFAULT_PORT: u16 = 443;

/// Flag-derived transport knobs, orthogonal to the [`Token`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// `--hostname-override`: replaces the SNI, never the dialed address.
    pub hostname_override: Option<String>,
    /// `--proxy`: HTTP proxy URL to tunnel through.
    pub proxy: Option<String>,
    /// `--max-message-size`: symmetric send/receive limit in bytes.
    pub max_message_size: usize,
    /// `--max-retries`: attempt budget for retryable methods.
    pub max_retries: u32,
    /// `--extra-header key=value`, repeatable.
    pub extra_headers: Vec<String>,
    /// `--request-id`: stamped as `x-request-id`.
    pub request_id: Option<String>,
    /// `--skip-version-check`.
    pub skip_version_check: bool,
    /// Dial timeout.
    pub connect_timeout: Duration,
    /// HTTP/2 keepalive ping interval.
    pub keepalive_interval: Duration,
    /// HTTP/2 keepalive ping timeout.
    pub keepalive_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            hostname_override: None,
            proxy: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_retries: 5,
            extra_headers: Vec::new(),
            request_id: None,
            skip_version_check: false,
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
        }
    }
}

/// Dials the permissions service described by `token` and returns the
/// configured backend.
///
/// Performs the version handshake unless `skip_version_check` is set: a
/// transport failure there is a hard error, a version mismatch only warns.
pub async fn connect(
    token: &Token,
    options: &TransportOptions,
    cancel: CancellationToken,
) -> ZedResult<GrpcBackend> {
    let (host, port) = split_endpoint(&token.endpoint)?;
    let mode = TlsMode::select(token)?;
    let tls = mode.client_config()?;

    let sni_host = options.hostname_override.as_deref().unwrap_or(&host);
    let sni = ServerName::try_from(sni_host.to_owned())
        .map_err(|_| ZedError::Tls(format!("\"{sni_host}\" is not a valid TLS server name")))?;

    let proxy = match &options.proxy {
        Some(raw) => Some(connector::parse_proxy(raw).map_err(ZedError::Validation)?),
        None => None,
    };

    let plan = Arc::new(DialPlan {
        host: host.clone(),
        port,
        sni,
        tls,
        proxy,
    });

    let scheme = if mode.uses_tls() { "https" } else { "http" };
    let endpoint = Endpoint::from_shared(format!("{scheme}://{host}:{port}"))
        .map_err(|err| ZedError::Validation(format!("invalid endpoint: {err}")))?
        .connect_timeout(options.connect_timeout)
        .http2_keep_alive_interval(options.keepalive_interval)
        .keep_alive_timeout(options.keepalive_timeout)
        .keep_alive_while_idle(true)
        .user_agent(format!("zed/{}", env!("CARGO_PKG_VERSION")))
        .map_err(|err| ZedError::Internal(format!("invalid user agent: {err}")))?;

    debug!(endpoint = %token.endpoint, tls = ?mode, proxy = options.proxy.is_some(), "dialing");

    let channel = endpoint
        .connect_with_connector(tower::service_fn(move |_uri: http::Uri| {
            let plan = plan.clone();
            async move {
                connector::dial(plan)
                    .await
                    .map(hyper_util::rt::TokioIo::new)
            }
        }))
        .await
        .map_err(|err| classify_dial_error(&err))?;

    let metadata = CallMetadata::build(
        token,
        options.request_id.as_deref(),
        &options.extra_headers,
    )?;
    let policy = RetryPolicy::with_max_attempts(options.max_retries);
    let backend = GrpcBackend::new(
        channel,
        metadata,
        policy,
        cancel,
        options.max_message_size,
    );

    if !options.skip_version_check {
        version::check(&backend).await?;
    }

    Ok(backend)
}

/// Splits `host:port` (port optional, 443 assumed) and rejects URL-shaped
/// endpoints: the dialer speaks gRPC only.
fn split_endpoint(endpoint: &str) -> ZedResult<(String, u16)> {
    if endpoint.is_empty() {
        return Err(ZedError::Validation(
            "no endpoint: configure a context or pass --endpoint".to_owned(),
        ));
    }
    if let Some((scheme, _)) = endpoint.split_once("://") {
        return Err(ZedError::Validation(format!(
            "unsupported scheme \"{scheme}\": the endpoint is a bare host:port"
        )));
    }
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port.parse().map_err(|_| {
                ZedError::Validation(format!("invalid port in endpoint \"{endpoint}\""))
            })?;
            Ok((host.to_owned(), port))
        }
        Some(_) => Err(ZedError::Validation(format!(
            "invalid endpoint \"{endpoint}\""
        ))),
        None => Ok((endpoint.to_owned(), DEFAULT_PORT)),
    }
}

fn classify_dial_error(err: &tonic::transport::Error) -> ZedError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message = format!("{message}: {inner}");
        source = inner.source();
    }
    let lowered = message.to_lowercase();
    if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("handshake")
    {
        ZedError::Tls(message)
    } else {
        ZedError::ConnectFailed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_split_into_host_and_port() {
        assert_eq!(
            split_endpoint("grpc.example.com:50051").unwrap(),
            ("grpc.example.com".to_owned(), 50051)
        );
        assert_eq!(
            split_endpoint("grpc.example.com").unwrap(),
            ("grpc.example.com".to_owned(), DEFAULT_PORT)
        );
    }

    #[test]
    fn url_shaped_endpoints_are_rejected() {
        assert!(matches!(
            split_endpoint("https://grpc.example.com"),
            Err(ZedError::Validation(_))
        ));
        assert!(split_endpoint("").is_err());
        assert!(split_endpoint("host:notaport").is_err());
    }
}
