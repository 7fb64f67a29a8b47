//! Loading of locally supplied certificate files.
//!
//! A local certificate is a PEM chain plus its private key. The hostnames
//! the certificate answers for are derived from the leaf's subject
//! alternative names (common name as a fallback), never configured
//! separately.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use x509_parser::extensions::GeneralName;

use super::TlsError;

/// A certificate chain, its signing key, and the hostnames it is valid for.
#[derive(Debug, Clone)]
pub struct LoadedCert {
    pub names: Vec<String>,
    pub key: Arc<CertifiedKey>,
}

/// Load a certificate chain and private key from PEM files.
///
/// Fails if either file is missing or unparseable, the chain is empty, or
/// the key's public half does not match the leaf certificate.
pub fn load_certified_key(
    cert_path: &Path,
    key_path: &Path,
    provider: &CryptoProvider,
) -> Result<LoadedCert, TlsError> {
    let cert_file = File::open(cert_path)
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {}", cert_path.display(), e)))?;
    let mut cert_reader = BufReader::new(cert_file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {}", cert_path.display(), e)))?;

    if certs.is_empty() {
        return Err(TlsError::CertificateLoad(format!(
            "{}: No certificates found in file",
            cert_path.display()
        )));
    }

    let key_file = File::open(key_path)
        .map_err(|e| TlsError::KeyLoad(format!("{}: {}", key_path.display(), e)))?;
    let mut key_reader = BufReader::new(key_file);

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| TlsError::KeyLoad(format!("{}: {}", key_path.display(), e)))?
        .ok_or_else(|| {
            TlsError::KeyLoad(format!(
                "{}: No private key found in file",
                key_path.display()
            ))
        })?;

    let signing_key = provider
        .key_provider
        .load_private_key(key)
        .map_err(|e| TlsError::KeyLoad(format!("{}: {:?}", key_path.display(), e)))?;

    let names = certificate_names(&certs[0])?;

    // The key must belong to the leaf; comparing SPKI encodings catches a
    // swapped key file before the first handshake does.
    if let Some(public) = signing_key.public_key() {
        let (_, leaf) = x509_parser::parse_x509_certificate(certs[0].as_ref())
            .map_err(|e| TlsError::CertificateLoad(format!("{}: {}", cert_path.display(), e)))?;
        if leaf.tbs_certificate.subject_pki.raw != public.as_ref() {
            return Err(TlsError::CertKeyMismatch(format!(
                "{} does not match {}",
                key_path.display(),
                cert_path.display()
            )));
        }
    }

    Ok(LoadedCert {
        names,
        key: Arc::new(CertifiedKey::new(certs, signing_key)),
    })
}

/// Extract the DNS names a certificate is valid for.
fn certificate_names(leaf: &CertificateDer<'_>) -> Result<Vec<String>, TlsError> {
    let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| TlsError::CertificateLoad(format!("invalid certificate: {}", e)))?;

    let mut names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for general_name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = general_name {
                names.push(dns.to_string());
            }
        }
    }

    if names.is_empty() {
        if let Some(cn) = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
        {
            names.push(cn.to_string());
        }
    }

    Ok(names)
}
