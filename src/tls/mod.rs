//! TLS configuration shared by both transports.
//!
//! The builder composes a fixed protocol baseline (TLS 1.3, AEAD cipher
//! suites, X25519 and P-256 key exchange, ALPN for h3/h2/http1.1) with
//! locally supplied certificates and/or on-demand ACME issuance into one
//! `rustls::ServerConfig`. The built config is immutable and the same `Arc`
//! is handed to the stream and datagram listeners.

mod acme;
pub(crate) mod local;
mod resolver;

pub use acme::{AcmeIssuer, HostPolicy};
pub use local::{load_certified_key, LoadedCert};
pub use resolver::CertResolver;

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::server::ResolvesServerCert;
use rustls::ServerConfig;
use rustls_acme::acme::ACME_TLS_ALPN_NAME;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to load certificate: {0}")]
    CertificateLoad(String),

    #[error("Failed to load private key: {0}")]
    KeyLoad(String),

    #[error("Certificate and key do not match: {0}")]
    CertKeyMismatch(String),

    #[error("Failed to build TLS config: {0}")]
    ConfigBuild(String),

    #[error("ACME setup failed: {0}")]
    Acme(String),
}

/// The protocol/cipher baseline: TLS 1.3 only, AEAD suites, modern curves.
fn base_provider() -> CryptoProvider {
    let mut provider = aws_lc_rs::default_provider();
    provider.cipher_suites = vec![
        aws_lc_rs::cipher_suite::TLS13_AES_256_GCM_SHA384,
        aws_lc_rs::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        aws_lc_rs::cipher_suite::TLS13_AES_128_GCM_SHA256,
    ];
    provider.kx_groups = vec![aws_lc_rs::kx_group::X25519, aws_lc_rs::kx_group::SECP256R1];
    provider
}

/// Builds the single TLS configuration used by both listeners.
///
/// At least one certificate source must be configured before `build`.
/// In hybrid setups the static set always wins over issuance for a matching
/// name; see [`CertResolver`] for the chain.
pub struct TlsConfigBuilder {
    provider: Arc<CryptoProvider>,
    static_certs: Vec<LoadedCert>,
    delegate: Option<(HostPolicy, Arc<dyn ResolvesServerCert>)>,
    alpn: Vec<Vec<u8>>,
}

impl TlsConfigBuilder {
    pub fn new() -> Self {
        Self {
            provider: Arc::new(base_provider()),
            static_certs: Vec::new(),
            delegate: None,
            alpn: vec![b"h3".to_vec(), b"h2".to_vec(), b"http/1.1".to_vec()],
        }
    }

    /// Append a locally loaded certificate to the static set.
    pub fn with_local(mut self, cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let cert = load_certified_key(cert_path, key_path, &self.provider)?;
        tracing::info!(
            cert = %cert_path.display(),
            names = ?cert.names,
            "Loaded local TLS certificate"
        );
        self.static_certs.push(cert);
        Ok(self)
    }

    /// Install an issuer as the tail of the resolution chain and enable the
    /// ACME validation ALPN identifier.
    pub fn with_acme(mut self, issuer: &AcmeIssuer) -> Self {
        self.delegate = Some((issuer.policy(), issuer.resolver()));
        self.alpn.push(ACME_TLS_ALPN_NAME.to_vec());
        self
    }

    pub fn build(self) -> Result<Arc<ServerConfig>, TlsError> {
        if self.static_certs.is_empty() && self.delegate.is_none() {
            return Err(TlsError::ConfigBuild(
                "no certificate source configured".to_string(),
            ));
        }

        let resolver = CertResolver::new(self.static_certs, self.delegate);

        let mut config = ServerConfig::builder_with_provider(self.provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| TlsError::ConfigBuild(e.to_string()))?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(resolver));

        config.alpn_protocols = self.alpn;

        Ok(Arc::new(config))
    }
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use local::tests::write_test_cert;

    #[test]
    fn build_without_sources_fails() {
        let err = TlsConfigBuilder::new().build().unwrap_err();
        assert!(matches!(err, TlsError::ConfigBuild(_)));
    }

    #[test]
    fn local_config_negotiates_both_transports() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = write_test_cert(dir.path(), "server", &["example.com"]);

        let config = TlsConfigBuilder::new()
            .with_local(&cert_path, &key_path)
            .unwrap()
            .build()
            .unwrap();

        assert!(config.alpn_protocols.contains(&b"h3".to_vec()));
        assert!(config.alpn_protocols.contains(&b"h2".to_vec()));
        assert!(config.alpn_protocols.contains(&b"http/1.1".to_vec()));
        // No issuance configured, so no validation ALPN either
        assert!(!config
            .alpn_protocols
            .contains(&ACME_TLS_ALPN_NAME.to_vec()));
    }

    #[test]
    fn with_local_propagates_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pem");
        let err = TlsConfigBuilder::new()
            .with_local(&missing, &missing)
            .unwrap_err();
        assert!(matches!(err, TlsError::CertificateLoad(_)));
    }
}
