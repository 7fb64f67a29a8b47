//! Multi-transport HTTP serving.
//!
//! One TLS configuration, two transports: the stream listener serves
//! HTTP/1.1 and HTTP/2 over TCP, the datagram listener serves HTTP/3 over
//! QUIC, both dispatching into the same router. The stream side advertises
//! the datagram side via the Alt-Svc header. A lifecycle controller binds
//! everything up front, supervises the serving tasks, and drives a
//! time-bounded drain at shutdown; when automatic certificate issuance is
//! enabled, a plain-HTTP redirect listener and the ACME event loop are
//! owned by the same controller.

mod altsvc;
mod h3;
mod lifecycle;
mod redirect;
mod server;
mod shutdown;

pub use lifecycle::{Lifecycle, LifecycleState};
pub use server::ServerError;
pub use shutdown::wait_for_signal;
