//! Configuration loading and constants.
//!
//! Loads application configuration from a TOML file and defines constants
//! for default paths, the discovery-header cache lifetime, and logging.
//! `AppConfig` is the root configuration struct containing all settings.

use serde::Deserialize;
use std::path::Path;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "cubby=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

// =============================================================================
// Transport Constants
// =============================================================================

/// Cache lifetime advertised in the Alt-Svc discovery header, in seconds
/// (30 days, the lifetime HTTP/3-capable servers conventionally advertise).
pub const ALT_SVC_MAX_AGE: u32 = 2_592_000;

/// Grace period for draining in-flight exchanges at shutdown, in seconds
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub http: HttpServerConfig,
    /// Embedded store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
///
/// The stream (TCP) and datagram (UDP) listeners share the same host and
/// port; the Alt-Svc header the stream listener emits points clients at the
/// datagram side.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Seconds to wait for in-flight exchanges before forcing connections
    /// closed at shutdown
    #[serde(default = "HttpServerConfig::default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    pub tls: TlsConfig,
}

impl HttpServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        443
    }

    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_SECS
    }
}

/// TLS mode selection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// User-provided certificate files only
    Manual,
    /// Automatic certificates from an ACME directory only
    Acme,
    /// Local certificates checked first, ACME issuance for everything else
    Hybrid,
}

/// TLS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub mode: TlsMode,

    /// Certificate chain path (manual and hybrid modes)
    #[serde(default = "TlsConfig::default_cert_path")]
    pub cert_path: String,
    /// Private key path (manual and hybrid modes)
    #[serde(default = "TlsConfig::default_key_path")]
    pub key_path: String,

    /// Contact email for the ACME account (acme and hybrid modes)
    pub acme_email: Option<String>,
    /// Hostnames automatic issuance is permitted for; anything else is
    /// denied at the handshake
    #[serde(default)]
    pub acme_domains: Vec<String>,
    /// Directory for cached ACME account data and certificates
    #[serde(default = "TlsConfig::default_acme_cache_dir")]
    pub acme_cache_dir: String,
    /// Use the production ACME directory instead of staging
    #[serde(default)]
    pub acme_production: bool,

    /// Run a plain-HTTP listener that redirects to HTTPS
    #[serde(default = "TlsConfig::default_redirect_http")]
    pub redirect_http: bool,
    /// Port for the plain-HTTP redirect listener
    #[serde(default = "TlsConfig::default_redirect_port")]
    pub redirect_port: u16,
}

impl TlsConfig {
    fn default_cert_path() -> String {
        "cert.pem".to_string()
    }

    fn default_key_path() -> String {
        "key.pem".to_string()
    }

    fn default_acme_cache_dir() -> String {
        "./acme-cache".to_string()
    }

    fn default_redirect_http() -> bool {
        true
    }

    fn default_redirect_port() -> u16 {
        80
    }

    /// Whether this configuration enables automatic issuance.
    pub fn acme_enabled(&self) -> bool {
        matches!(self.mode, TlsMode::Acme | TlsMode::Hybrid)
    }
}

/// Embedded store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Database file path
    #[serde(default = "StorageConfig::default_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

impl StorageConfig {
    fn default_path() -> String {
        "kv.db".to_string()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let tls = &self.http.tls;
        if tls.acme_enabled() {
            if tls.acme_email.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "acme_email is required when tls.mode is \"acme\" or \"hybrid\"".to_string(),
                ));
            }
            if tls.acme_domains.is_empty() {
                return Err(ConfigError::Validation(
                    "acme_domains must list at least one hostname when tls.mode is \"acme\" or \"hybrid\""
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
