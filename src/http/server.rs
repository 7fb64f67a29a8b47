//! Stream (TCP + TLS) listener.
//!
//! Binds eagerly so address conflicts surface before any task is spawned,
//! then serves HTTP/1.1 and HTTP/2 over the shared rustls configuration.
//! Per-connection failures (resets, bad handshakes) are handled inside
//! axum-server and never reach the serve future; an error here is fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {listener} listener: {source}")]
    Bind {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare QUIC handshake config: {0}")]
    QuicTls(String),

    #[error("Server error: {0}")]
    Serve(String),
}

/// TCP listener serving HTTPS with the shared TLS configuration.
pub struct StreamListener {
    listener: std::net::TcpListener,
    handle: Handle,
    tls: RustlsConfig,
}

impl StreamListener {
    /// Bind the address. Failure here is fatal to startup.
    pub fn bind(addr: SocketAddr, tls: Arc<rustls::ServerConfig>) -> Result<Self, ServerError> {
        let listener = std::net::TcpListener::bind(addr).map_err(|e| ServerError::Bind {
            listener: "stream",
            source: e,
        })?;
        listener.set_nonblocking(true).map_err(|e| ServerError::Bind {
            listener: "stream",
            source: e,
        })?;
        Ok(Self {
            listener,
            handle: Handle::new(),
            tls: RustlsConfig::from_config(tls),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle used by the lifecycle controller for bounded drain.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Accept and serve connections until the handle shuts the server down.
    pub async fn serve(self, app: Router) -> Result<(), ServerError> {
        axum_server::from_tcp_rustls(self.listener, self.tls)
            .handle(self.handle)
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}
