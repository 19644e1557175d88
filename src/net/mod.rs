//! Network-facing connection bookkeeping.
//!
//! # Data Flow
//! ```text
//! SSH server accepts TCP connection
//!     → Dispatcher::accept_connection(remote_addr, connection_id)
//!     → connection.rs (identity, live-connection tracking)
//!     → ConnectionCoordinator owns the guard until dropped
//! ```
//!
//! # Design Decisions
//! - Connection IDs are opaque strings supplied by the SSH layer
//! - Each coordinator is tracked for shutdown draining

pub mod connection;
