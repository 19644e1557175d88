//! Connection-scoped backend dispatch for an SSH server.
//!
//! The SSH protocol layer owns sockets and cryptography. This crate decides,
//! per connection, which backend services the session and drives that
//! backend through authentication, handshake, disconnect and shutdown.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use backend::{BackendContext, BackendError, BackendHandler, BackendName, BackendRegistry, SessionHandler};
pub use config::AppConfig;
pub use dispatch::{AuthDecision, ConnectionCoordinator, ConnectionPhase, DispatchError, Dispatcher};
pub use lifecycle::shutdown::Shutdown;
pub use net::connection::ConnectionId;
