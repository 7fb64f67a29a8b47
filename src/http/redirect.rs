//! HTTP to HTTPS redirect listener.
//!
//! A lightweight plain-HTTP server on the well-known HTTP port that
//! redirects every request to the HTTPS endpoint. Unlike the TLS
//! listeners it terminates no secure traffic, but it is bound and drained
//! by the lifecycle controller the same way.

use std::net::SocketAddr;

use axum::http::{StatusCode, Uri};
use axum::response::Redirect;
use axum::routing::any;
use axum::Router;
use axum_extra::extract::Host;
use axum_server::Handle;

use super::server::ServerError;

/// Plain-HTTP listener answering every request with a redirect.
pub struct RedirectListener {
    listener: std::net::TcpListener,
    handle: Handle,
    https_port: u16,
}

impl RedirectListener {
    /// Bind the plain-HTTP port. Failure is fatal to startup.
    pub fn bind(http_port: u16, https_port: u16) -> Result<Self, ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
        let listener = std::net::TcpListener::bind(addr).map_err(|e| ServerError::Bind {
            listener: "redirect",
            source: e,
        })?;
        listener.set_nonblocking(true).map_err(|e| ServerError::Bind {
            listener: "redirect",
            source: e,
        })?;
        Ok(Self {
            listener,
            handle: Handle::new(),
            https_port,
        })
    }

    /// Handle used by the lifecycle controller for bounded drain.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub async fn serve(self) -> Result<(), ServerError> {
        let https_port = self.https_port;

        tracing::info!(
            http_port = %self.listener.local_addr().map(|a| a.port()).unwrap_or_default(),
            https_port = %https_port,
            "Starting HTTP->HTTPS redirect listener"
        );

        let app = Router::new().fallback(any(move |Host(host): Host, uri: Uri| async move {
            redirect_to_https(host, uri, https_port)
        }));

        axum_server::from_tcp(self.listener)
            .handle(self.handle)
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}

/// Generate a redirect response from HTTP to HTTPS.
fn redirect_to_https(host: String, uri: Uri, https_port: u16) -> Result<Redirect, StatusCode> {
    let target = https_url(&host, &uri, https_port);
    tracing::debug!(from = %uri, to = %target, "Redirecting HTTP to HTTPS");
    Ok(Redirect::permanent(&target))
}

/// Build the HTTPS URL for a redirect, dropping any port in the host.
fn https_url(host: &str, uri: &Uri, https_port: u16) -> String {
    let host_without_port = host.split(':').next().unwrap_or(host);
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if https_port == 443 {
        format!("https://{}{}", host_without_port, path_and_query)
    } else {
        format!("https://{}:{}{}", host_without_port, https_port, path_and_query)
    }
}
