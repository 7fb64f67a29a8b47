//! Server lifecycle controller.
//!
//! Owns every serving task: the stream listener, the datagram listener,
//! the optional plain-HTTP redirect listener, and the ACME event loop when
//! issuance is enabled. All listeners are bound before anything serves, so
//! an address conflict aborts startup instead of surfacing from a task.
//! After the shutdown signal, every listener gets the same bounded drain;
//! exceeding the deadline is logged and the remainder force-closed.
//!
//! The controller is single-use: `run` consumes it, and the state can only
//! move forward through `NotStarted -> Running -> ShuttingDown -> Stopped`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::HttpServerConfig;

use super::altsvc::alt_svc_layer;
use super::h3::DatagramListener;
use super::redirect::RedirectListener;
use super::server::{ServerError, StreamListener};

/// Where the server is in its life. Published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Running,
    ShuttingDown,
    Stopped,
}

/// Controller owning both transports and their auxiliary tasks.
pub struct Lifecycle {
    stream: StreamListener,
    datagram: DatagramListener,
    redirect: Option<RedirectListener>,
    acme_task: Option<JoinHandle<()>>,
    grace: Duration,
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    /// Bind every listener. Any bind failure aborts startup; listeners
    /// already bound are released on drop.
    pub fn bind(
        addr: SocketAddr,
        tls: Arc<rustls::ServerConfig>,
        http: &HttpServerConfig,
        acme_task: Option<JoinHandle<()>>,
    ) -> Result<Self, ServerError> {
        let stream = StreamListener::bind(addr, tls.clone())?;
        let datagram = DatagramListener::bind(addr, tls)?;
        let redirect = if http.tls.redirect_http {
            Some(RedirectListener::bind(http.tls.redirect_port, addr.port())?)
        } else {
            None
        };
        let (state, _) = watch::channel(LifecycleState::NotStarted);

        Ok(Self {
            stream,
            datagram,
            redirect,
            acme_task,
            grace: Duration::from_secs(http.shutdown_grace_seconds),
            state,
        })
    }

    /// Bound address of the stream (TCP) listener.
    pub fn stream_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Bound address of the datagram (UDP) listener.
    pub fn datagram_addr(&self) -> std::io::Result<SocketAddr> {
        self.datagram.local_addr()
    }

    /// Observe lifecycle state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serve both transports until `shutdown` resolves, then drain.
    ///
    /// A serve failure on either transport is fatal: the other tasks are
    /// aborted and the error returned. Consumes the controller; a stopped
    /// server cannot be restarted.
    pub async fn run(
        self,
        app: Router,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        let Self {
            stream,
            datagram,
            redirect,
            acme_task,
            grace,
            state,
        } = self;

        // The stream side advertises where the datagram side actually
        // listens; the handler itself is shared untouched.
        let advertised_port = datagram
            .local_addr()
            .map(|a| a.port())
            .map_err(|e| ServerError::Serve(format!("datagram local address: {e}")))?;
        let stream_app = app.clone().layer(alt_svc_layer(advertised_port));

        let stream_handle = stream.handle();
        let datagram_shutdown = datagram.shutdown_handle();
        let redirect_handle = redirect.as_ref().map(|r| r.handle());

        state.send_replace(LifecycleState::Running);
        tracing::info!("Started");

        let mut stream_task = tokio::spawn(stream.serve(stream_app));
        let mut datagram_task = tokio::spawn(datagram.serve(app));
        let redirect_task = redirect.map(|r| tokio::spawn(r.serve()));

        tokio::pin!(shutdown);
        tokio::select! {
            _ = &mut shutdown => {}
            result = &mut stream_task => {
                datagram_task.abort();
                if let Some(task) = redirect_task {
                    task.abort();
                }
                if let Some(task) = acme_task {
                    task.abort();
                }
                state.send_replace(LifecycleState::Stopped);
                return Err(task_failure("stream", result));
            }
            result = &mut datagram_task => {
                stream_task.abort();
                if let Some(task) = redirect_task {
                    task.abort();
                }
                if let Some(task) = acme_task {
                    task.abort();
                }
                state.send_replace(LifecycleState::Stopped);
                return Err(task_failure("datagram", result));
            }
        }

        state.send_replace(LifecycleState::ShuttingDown);
        tracing::info!("Stopping");

        let drain_started = Instant::now();
        stream_handle.graceful_shutdown(Some(grace));
        if let Some(handle) = &redirect_handle {
            handle.graceful_shutdown(Some(grace));
        }

        let (datagram_drained, stream_result) =
            tokio::join!(datagram_shutdown.shutdown(grace), &mut stream_task);
        if let Err(e) = flatten(stream_result) {
            tracing::error!(error = %e, "Stream listener failed during shutdown");
        }
        if let Some(mut task) = redirect_task {
            if let Err(e) = flatten((&mut task).await) {
                tracing::error!(error = %e, "Redirect listener failed during shutdown");
            }
        }
        let _ = (&mut datagram_task).await;

        if !datagram_drained || drain_started.elapsed() > grace {
            tracing::warn!(
                grace_seconds = grace.as_secs(),
                "Graceful shutdown deadline exceeded, remaining connections were closed forcibly"
            );
        }

        if let Some(task) = acme_task {
            task.abort();
        }

        state.send_replace(LifecycleState::Stopped);
        tracing::info!("Stopped");
        Ok(())
    }
}

fn flatten(
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(join) => Err(ServerError::Serve(join.to_string())),
    }
}

/// Map a finished listener task into the fatal error `run` reports.
fn task_failure(
    listener: &'static str,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> ServerError {
    match result {
        Ok(Ok(())) => ServerError::Serve(format!("{listener} listener exited unexpectedly")),
        Ok(Err(err)) => err,
        Err(join) => ServerError::Serve(format!("{listener} listener task failed: {join}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tls::local::tests::write_test_cert;
    use crate::tls::TlsConfigBuilder;

    fn test_tls() -> Arc<rustls::ServerConfig> {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_test_cert(dir.path(), "server", &["localhost"]);
        TlsConfigBuilder::new()
            .with_local(&cert, &key)
            .unwrap()
            .build()
            .unwrap()
    }

    fn test_http_config(redirect: bool) -> HttpServerConfig {
        let toml_str = format!(
            r#"
            [http]
            host = "127.0.0.1"
            port = 0
            shutdown_grace_seconds = 1
            [http.tls]
            mode = "manual"
            redirect_http = {redirect}
            redirect_port = 0
            "#
        );
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.http
    }

    #[tokio::test]
    async fn idle_server_stops_within_the_deadline() {
        let lifecycle = Lifecycle::bind(
            "127.0.0.1:0".parse().unwrap(),
            test_tls(),
            &test_http_config(true),
            None,
        )
        .unwrap();

        let state = lifecycle.subscribe_state();
        assert_eq!(*state.borrow(), LifecycleState::NotStarted);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            lifecycle.run(Router::new(), std::future::ready(())),
        )
        .await
        .expect("shutdown of an idle server must not hang");
        result.unwrap();

        assert_eq!(*state.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stream_bind_conflict_aborts_startup() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let err = Lifecycle::bind(addr, test_tls(), &test_http_config(false), None).unwrap_err();
        assert!(matches!(err, ServerError::Bind { listener: "stream", .. }));
    }

    #[tokio::test]
    async fn datagram_bind_conflict_aborts_startup() {
        let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let err = Lifecycle::bind(addr, test_tls(), &test_http_config(false), None)
            .map(|_| ())
            .unwrap_err();
        // The TCP side of the same port may coincidentally be taken too,
        // so either listener may report the conflict.
        assert!(matches!(err, ServerError::Bind { .. }), "got {err}");
    }

    #[tokio::test]
    async fn listeners_get_distinct_transport_addresses() {
        let lifecycle = Lifecycle::bind(
            "127.0.0.1:0".parse().unwrap(),
            test_tls(),
            &test_http_config(false),
            None,
        )
        .unwrap();

        assert_ne!(lifecycle.stream_addr().unwrap().port(), 0);
        assert_ne!(lifecycle.datagram_addr().unwrap().port(), 0);
    }
}
