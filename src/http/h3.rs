//! Datagram (QUIC + HTTP/3) listener.
//!
//! A quinn endpoint derives its handshake configuration from the same
//! `rustls::ServerConfig` the stream listener uses. Each accepted
//! connection multiplexes request streams; every stream is dispatched into
//! the shared router independently, so responses may complete out of
//! order. Connection and stream failures are logged at debug and isolated
//! to the connection they occur on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use super::server::ServerError;

/// UDP listener serving HTTP/3 with the shared TLS configuration.
pub struct DatagramListener {
    endpoint: quinn::Endpoint,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Shutdown control over a serving [`DatagramListener`], held by the
/// lifecycle controller.
#[derive(Clone)]
pub struct DatagramShutdown {
    endpoint: quinn::Endpoint,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl DatagramListener {
    /// Bind the UDP address and derive the QUIC handshake config.
    /// Failure of either is fatal to startup.
    pub fn bind(addr: SocketAddr, tls: Arc<rustls::ServerConfig>) -> Result<Self, ServerError> {
        let quic_tls = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
            .map_err(|e| ServerError::QuicTls(e.to_string()))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_tls));
        let endpoint = quinn::Endpoint::server(server_config, addr).map_err(|e| {
            ServerError::Bind {
                listener: "datagram",
                source: e,
            }
        })?;
        Ok(Self {
            endpoint,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn shutdown_handle(&self) -> DatagramShutdown {
        DatagramShutdown {
            endpoint: self.endpoint.clone(),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
        }
    }

    /// Accept QUIC connections until told to stop.
    pub async fn serve(self, app: Router) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                incoming = self.endpoint.accept() => {
                    let Some(incoming) = incoming else { break };
                    let app = app.clone();
                    let tracker = self.tracker.clone();
                    self.tracker.spawn(serve_connection(incoming, app, tracker));
                }
            }
        }
        Ok(())
    }
}

impl DatagramShutdown {
    /// Stop accepting, drain in-flight streams up to `grace`, then close
    /// whatever remains. Returns false when the deadline was exceeded.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        self.endpoint.close(0u32.into(), b"server shutdown");
        drained
    }
}

/// Complete the QUIC handshake and serve the connection's request streams.
async fn serve_connection(incoming: quinn::Incoming, app: Router, tracker: TaskTracker) {
    let connection = match incoming.await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::debug!(error = %e, "QUIC handshake failed");
            return;
        }
    };

    let mut conn: h3::server::Connection<h3_quinn::Connection, Bytes> =
        match h3::server::Connection::new(h3_quinn::Connection::new(connection)).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(error = %e, "HTTP/3 connection setup failed");
                return;
            }
        };

    loop {
        match conn.accept().await {
            Ok(Some((request, stream))) => {
                let app = app.clone();
                // Streams are independent; one slow exchange must not hold
                // up the connection's other requests.
                tracker.spawn(async move {
                    if let Err(e) = serve_request(request, stream, app).await {
                        tracing::debug!(error = %e, "HTTP/3 request failed");
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "HTTP/3 connection closed");
                break;
            }
        }
    }
}

/// Run a single request stream through the router.
async fn serve_request(
    request: http::Request<()>,
    mut stream: h3::server::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>,
    app: Router,
) -> Result<(), h3::Error> {
    let (parts, _) = request.into_parts();

    let mut body = BytesMut::new();
    while let Some(chunk) = stream.recv_data().await? {
        body.put(chunk);
    }

    let request = http::Request::from_parts(parts, axum::body::Body::from(body.freeze()));
    let response = match app.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let (parts, body) = response.into_parts();
    stream
        .send_response(http::Response::from_parts(parts, ()))
        .await?;

    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            if !bytes.is_empty() {
                stream.send_data(bytes).await?;
            }
        }
        Err(e) => {
            // The response head is already on the wire; all we can do is
            // end the stream.
            tracing::debug!(error = %e, "Failed to read response body");
        }
    }

    stream.finish().await
}
