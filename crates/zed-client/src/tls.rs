//! TLS mode selection and rustls client configuration.

use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use zed_config::Token;
use zed_core::{ZedError, ZedResult};

/// How the connection to the endpoint is protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// No TLS at all.
    Plaintext,
    /// TLS against the system trust roots.
    SystemCerts,
    /// TLS, but any presented certificate is accepted.
    SystemCertsNoVerify,
    /// TLS against a custom CA bundle.
    CustomCa(Vec<u8>),
}

impl TlsMode {
    /// Chooses exactly one mode from a resolved token.
    ///
    /// `--insecure` together with an explicit `--no-verify-ca=false` asks
    /// for plaintext *and* CA verification at once and is rejected.
    pub fn select(token: &Token) -> ZedResult<Self> {
        if token.insecure == Some(true) {
            if token.no_verify_ca == Some(false) {
                return Err(ZedError::Validation(
                    "--insecure and --no-verify-ca=false are mutually inconsistent".to_owned(),
                ));
            }
            return Ok(Self::Plaintext);
        }
        if token.no_verify_ca == Some(true) {
            return Ok(Self::SystemCertsNoVerify);
        }
        if let Some(ca) = &token.ca_cert {
            return Ok(Self::CustomCa(ca.clone()));
        }
        Ok(Self::SystemCerts)
    }

    /// True when the dialed stream carries TLS.
    #[must_use]
    pub fn uses_tls(&self) -> bool {
        !matches!(self, Self::Plaintext)
    }

    /// Builds the rustls client config for this mode.
    ///
    /// gRPC runs over HTTP/2, so every config advertises `h2` via ALPN.
    pub fn client_config(&self) -> ZedResult<Option<Arc<ClientConfig>>> {
        let mut config = match self {
            Self::Plaintext => return Ok(None),
            Self::SystemCerts => ClientConfig::builder()
                .with_root_certificates(system_roots()?)
                .with_no_client_auth(),
            Self::SystemCertsNoVerify => ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth(),
            Self::CustomCa(pem) => ClientConfig::builder()
                .with_root_certificates(custom_roots(pem)?)
                .with_no_client_auth(),
        };
        config.alpn_protocols = vec![b"h2".to_vec()];
        Ok(Some(Arc::new(config)))
    }
}

fn system_roots() -> ZedResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::debug!(error = %err, "skipping unreadable system root");
    }
    for cert in loaded.certs {
        // Individual unparsable roots are skipped, same as the platform does.
        let _ = roots.add(cert);
    }
    if roots.is_empty() {
        return Err(ZedError::Tls(
            "no usable system trust roots were found".to_owned(),
        ));
    }
    Ok(roots)
}

fn custom_roots(pem: &[u8]) -> ZedResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let mut reader = std::io::Cursor::new(pem);
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|err| {
            ZedError::Tls(format!("invalid certificate in CA bundle: {err}"))
        })?;
        roots
            .add(cert)
            .map_err(|err| ZedError::Tls(format!("rejected CA certificate: {err}")))?;
    }
    if roots.is_empty() {
        return Err(ZedError::Tls(
            "the CA bundle contains no certificates".to_owned(),
        ));
    }
    Ok(roots)
}

/// Verifier for `--no-verify-ca`: accepts any presented chain.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(insecure: Option<bool>, no_verify: Option<bool>, ca: Option<Vec<u8>>) -> Token {
        Token {
            insecure,
            no_verify_ca: no_verify,
            ca_cert: ca,
            ..Token::default()
        }
    }

    #[test]
    fn exactly_one_mode_is_chosen() {
        assert_eq!(
            TlsMode::select(&token(Some(true), None, None)).unwrap(),
            TlsMode::Plaintext
        );
        assert_eq!(
            TlsMode::select(&token(None, Some(true), None)).unwrap(),
            TlsMode::SystemCertsNoVerify
        );
        assert_eq!(
            TlsMode::select(&token(None, None, Some(b"PEM".to_vec()))).unwrap(),
            TlsMode::CustomCa(b"PEM".to_vec())
        );
        assert_eq!(
            TlsMode::select(&token(None, None, None)).unwrap(),
            TlsMode::SystemCerts
        );
        assert_eq!(
            TlsMode::select(&token(Some(false), None, None)).unwrap(),
            TlsMode::SystemCerts
        );
    }

    #[test]
    fn plaintext_with_explicit_verification_is_inconsistent() {
        let err = TlsMode::select(&token(Some(true), Some(false), None)).unwrap_err();
        assert!(matches!(err, ZedError::Validation(_)));
        // An unset no-verify flag is not the inconsistent pair.
        assert!(TlsMode::select(&token(Some(true), None, None)).is_ok());
        // Both set to true selects plaintext; the flags agree on "no verify".
        assert_eq!(
            TlsMode::select(&token(Some(true), Some(true), None)).unwrap(),
            TlsMode::Plaintext
        );
    }

    #[test]
    fn no_verify_wins_over_a_custom_ca() {
        let mode = TlsMode::select(&token(None, Some(true), Some(b"PEM".to_vec()))).unwrap();
        assert_eq!(mode, TlsMode::SystemCertsNoVerify);
    }
}
