//! The custom dialer behind the tonic channel.
//!
//! One dial plan covers every connection attempt: TCP to the endpoint (or
//! an HTTP CONNECT tunnel through a proxy when the origin is TLS), then the
//! optional rustls handshake with the SNI chosen at build time. tonic calls
//! back into [`dial`] through `connect_with_connector`, so reconnects follow
//! the same path.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::Engine as _;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything needed to reach the endpoint, computed once at build time.
pub(crate) struct DialPlan {
    /// Endpoint host as dialed (or tunneled to).
    pub(crate) host: String,
    /// Endpoint port.
    pub(crate) port: u16,
    /// SNI presented during the handshake; differs from `host` only under
    /// `--hostname-override`.
    pub(crate) sni: ServerName<'static>,
    /// TLS client config; `None` dials plaintext.
    pub(crate) tls: Option<Arc<ClientConfig>>,
    /// Proxy to tunnel through, when configured.
    pub(crate) proxy: Option<ProxyPlan>,
}

/// A parsed `--proxy` URL.
pub(crate) struct ProxyPlan {
    pub(crate) host: String,
    pub(crate) port: u16,
    /// `Proxy-Authorization` value derived from URL userinfo.
    pub(crate) basic_auth: Option<String>,
}

/// Dials one connection according to the plan.
pub(crate) async fn dial(plan: Arc<DialPlan>) -> Result<MaybeTlsStream, BoxError> {
    // TLS origins tunnel through the proxy with CONNECT; plaintext origins
    // dial the endpoint directly.
    let tcp = match (&plan.proxy, plan.tls.is_some()) {
        (Some(proxy), true) => connect_through_proxy(proxy, &plan.host, plan.port).await?,
        _ => TcpStream::connect((plan.host.as_str(), plan.port)).await?,
    };
    tcp.set_nodelay(true)?;

    match &plan.tls {
        None => Ok(MaybeTlsStream::Plain(tcp)),
        Some(config) => {
            let connector = TlsConnector::from(config.clone());
            let stream = connector.connect(plan.sni.clone(), tcp).await?;
            Ok(MaybeTlsStream::Tls(Box::new(stream)))
        }
    }
}

async fn connect_through_proxy(
    proxy: &ProxyPlan,
    host: &str,
    port: u16,
) -> Result<TcpStream, BoxError> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(auth) = &proxy.basic_auth {
        request.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read the response head only; the tunnel bytes follow immediately.
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > 8 * 1024 {
            return Err("proxy CONNECT response head exceeds 8 KiB".into());
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err("proxy closed the connection during CONNECT".into());
        }
        head.push(byte[0]);
    }
    let status_line = head
        .split(|&b| b == b'\r')
        .next()
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .unwrap_or_default();
    let ok = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code == "200");
    if !ok {
        return Err(format!("proxy refused CONNECT: {status_line}").into());
    }
    Ok(stream)
}

/// Parses `--proxy` into a [`ProxyPlan`].
pub(crate) fn parse_proxy(raw: &str) -> Result<ProxyPlan, String> {
    let url = url::Url::parse(raw).map_err(|err| format!("invalid proxy URL: {err}"))?;
    if url.scheme() != "http" {
        return Err(format!(
            "unsupported proxy scheme \"{}\"; only http proxies are supported",
            url.scheme()
        ));
    }
    let host = url
        .host_str()
        .ok_or_else(|| "proxy URL has no host".to_owned())?
        .to_owned();
    let port = url.port().unwrap_or(3128);
    let basic_auth = if url.username().is_empty() {
        None
    } else {
        let credentials = format!(
            "{}:{}",
            url.username(),
            url.password().unwrap_or_default()
        );
        Some(base64::engine::general_purpose::STANDARD.encode(credentials))
    };
    Ok(ProxyPlan {
        host,
        port,
        basic_auth,
    })
}

/// A TCP stream with or without a TLS layer.
pub(crate) enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_proxy() {
        let plan = parse_proxy("http://proxy.internal:8080").unwrap();
        assert_eq!(plan.host, "proxy.internal");
        assert_eq!(plan.port, 8080);
        assert!(plan.basic_auth.is_none());
    }

    #[test]
    fn parses_proxy_credentials_into_basic_auth() {
        let plan = parse_proxy("http://user:pw@proxy.internal:8080").unwrap();
        assert_eq!(plan.basic_auth.as_deref(), Some("dXNlcjpwdw=="));
    }

    #[test]
    fn defaults_the_proxy_port() {
        let plan = parse_proxy("http://proxy.internal").unwrap();
        assert_eq!(plan.port, 3128);
    }

    #[test]
    fn rejects_non_http_proxies() {
        assert!(parse_proxy("socks5://proxy.internal:1080").is_err());
        assert!(parse_proxy("not a url").is_err());
    }
}
