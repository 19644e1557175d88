//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! SSH server accepts a connection
//!     → dispatcher.rs (Dispatcher::accept_connection: span + tracking)
//!     → coordinator.rs (ConnectionCoordinator, one per connection)
//!         → auth callbacks answer with the default AuthDecision
//!         → handshake success:
//!             config::resolver (remote overrides, bounded by a timeout)
//!             → backend::registry (construct the selected backend)
//!             → security::overlay (wrap, when enabled)
//!             → store handle, delegate handshake
//!         → disconnect: take handle, release backend once
//!         → shutdown: forward deadline to the held backend
//! ```
//!
//! # Design Decisions
//! - No backend exists before the handshake completes
//! - The connection lock is never held across a backend call
//! - Every failure is a [`DispatchError`] carrying the connection id

pub mod auth;
pub mod coordinator;
pub mod dispatcher;
pub mod error;

pub use auth::AuthDecision;
pub use coordinator::{ConnectionCoordinator, ConnectionPhase};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
