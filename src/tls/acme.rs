//! Automatic certificate issuance.
//!
//! Wraps the ACME client library: certificates are requested on demand for
//! whitelisted hostnames, validated via the TLS-ALPN challenge on the TLS
//! port itself, and cached on disk. The issuance/renewal event loop runs as
//! a task owned by the lifecycle controller.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use rustls::server::ResolvesServerCert;
use rustls_acme::caches::DirCache;
use rustls_acme::AcmeConfig;
use tokio::task::JoinHandle;

use super::TlsError;

/// Hostnames automatic issuance is permitted for. Requests for any other
/// hostname fail closed before the certificate authority is contacted.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    allowed: HashSet<String>,
}

impl HostPolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: hosts
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn allows(&self, hostname: &str) -> bool {
        self.allowed.contains(&hostname.to_ascii_lowercase())
    }
}

/// On-demand certificate issuer for a fixed set of hostnames.
pub struct AcmeIssuer {
    resolver: Arc<dyn ResolvesServerCert>,
    policy: HostPolicy,
}

impl AcmeIssuer {
    /// Set up issuance for `domains` and spawn the event loop that drives
    /// certificate orders and renewals.
    ///
    /// The returned task handle is handed to the lifecycle controller so
    /// the loop is stopped with the listeners instead of outliving them.
    pub fn spawn(
        email: &str,
        domains: &[String],
        cache_dir: &str,
        production: bool,
    ) -> Result<(Self, JoinHandle<()>), TlsError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| {
            TlsError::Acme(format!(
                "failed to create cache directory '{cache_dir}': {e}"
            ))
        })?;

        let env_name = if production { "production" } else { "staging" };
        tracing::info!(
            domains = ?domains,
            email = %email,
            cache = %cache_dir,
            environment = %env_name,
            "Enabling automatic certificate issuance"
        );

        if !production {
            tracing::warn!(
                "Using the staging ACME directory - issued certificates will NOT be trusted \
                 by browsers. Set acme_production = true for production use."
            );
        }

        let mut state = AcmeConfig::new(domains)
            .contact_push(format!("mailto:{email}"))
            .cache(DirCache::new(cache_dir.to_string()))
            .directory_lets_encrypt(production)
            .state();

        let resolver = state.resolver();

        let task = tokio::spawn(async move {
            loop {
                match state.next().await {
                    Some(Ok(event)) => {
                        tracing::info!(event = ?event, "ACME event");
                    }
                    Some(Err(err)) => {
                        tracing::error!(error = %err, "ACME error");
                    }
                    None => {
                        tracing::debug!("ACME state stream ended");
                        break;
                    }
                }
            }
        });

        let issuer = Self {
            resolver,
            policy: HostPolicy::new(domains),
        };
        Ok((issuer, task))
    }

    pub fn resolver(&self) -> Arc<dyn ResolvesServerCert> {
        self.resolver.clone()
    }

    pub fn policy(&self) -> HostPolicy {
        self.policy.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_allows_listed_hosts() {
        let policy = HostPolicy::new(["example.com", "www.example.com"]);
        assert!(policy.allows("example.com"));
        assert!(policy.allows("www.example.com"));
        assert!(!policy.allows("other.com"));
    }

    #[test]
    fn policy_is_case_insensitive() {
        let policy = HostPolicy::new(["Example.COM"]);
        assert!(policy.allows("example.com"));
        assert!(policy.allows("EXAMPLE.com"));
    }

    #[test]
    fn empty_policy_denies_everything() {
        let policy = HostPolicy::new(Vec::<String>::new());
        assert!(!policy.allows("example.com"));
    }
}
