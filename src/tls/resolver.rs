//! Certificate selection for incoming handshakes.
//!
//! Selection is an explicit ordered chain evaluated against the requested
//! server name: ACME validation handshakes go straight to the issuance
//! delegate, then the static certificate set is consulted (exact match
//! before wildcard semantics), and only an unmatched name falls through to
//! the policy-gated delegate. A name outside the issuance whitelist fails
//! the handshake rather than reaching the certificate authority.

use std::sync::Arc;

use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls_acme::is_tls_alpn_challenge;

use super::acme::HostPolicy;
use super::local::LoadedCert;

/// What the chain decided for a requested name.
#[derive(Debug)]
pub(crate) enum Selection {
    /// A statically configured certificate covers the name
    Static(Arc<CertifiedKey>),
    /// Hand the handshake to the issuance delegate
    Delegate,
    /// The name is outside the issuance whitelist
    Denied,
    /// Nothing can serve this handshake
    NoMatch,
}

#[derive(Debug)]
struct IssuerDelegate {
    policy: HostPolicy,
    resolver: Arc<dyn ResolvesServerCert>,
}

/// `ResolvesServerCert` implementation combining the static certificate set
/// with an optional issuance delegate.
#[derive(Debug)]
pub struct CertResolver {
    static_certs: Vec<LoadedCert>,
    delegate: Option<IssuerDelegate>,
}

impl CertResolver {
    pub fn new(
        static_certs: Vec<LoadedCert>,
        delegate: Option<(HostPolicy, Arc<dyn ResolvesServerCert>)>,
    ) -> Self {
        Self {
            static_certs,
            delegate: delegate.map(|(policy, resolver)| IssuerDelegate { policy, resolver }),
        }
    }

    fn first_static(&self) -> Selection {
        match self.static_certs.first() {
            Some(cert) => Selection::Static(cert.key.clone()),
            None => Selection::NoMatch,
        }
    }

    /// Evaluate the resolution chain for a server name.
    pub(crate) fn select(&self, server_name: Option<&str>) -> Selection {
        let Some(name) = server_name else {
            // No SNI: serve the first local certificate if one exists;
            // issuance is impossible without a name.
            return self.first_static();
        };

        for cert in &self.static_certs {
            if cert.names.iter().any(|n| hostname_matches(n, name)) {
                return Selection::Static(cert.key.clone());
            }
        }

        match &self.delegate {
            Some(delegate) if delegate.policy.allows(name) => Selection::Delegate,
            Some(_) => Selection::Denied,
            // Without a delegate an unmatched name still gets the first
            // local certificate; the client decides whether to accept it.
            None => self.first_static(),
        }
    }
}

impl ResolvesServerCert for CertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        if let Some(delegate) = &self.delegate {
            if is_tls_alpn_challenge(&client_hello) {
                return delegate.resolver.resolve(client_hello);
            }
        }

        let server_name = client_hello.server_name().map(str::to_owned);
        match self.select(server_name.as_deref()) {
            Selection::Static(key) => Some(key),
            Selection::Delegate => self
                .delegate
                .as_ref()
                .and_then(|d| d.resolver.resolve(client_hello)),
            Selection::Denied => {
                tracing::warn!(
                    server_name = server_name.as_deref().unwrap_or(""),
                    "Hostname not in issuance whitelist, refusing handshake"
                );
                None
            }
            Selection::NoMatch => {
                tracing::debug!(
                    server_name = server_name.as_deref().unwrap_or(""),
                    "No certificate available for handshake"
                );
                None
            }
        }
    }
}

/// Match a requested hostname against a certificate name, honoring
/// single-label wildcards.
pub(crate) fn hostname_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match name.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        pattern == name
    }
}
