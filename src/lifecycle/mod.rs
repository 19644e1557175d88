//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Dispatcher::shutdown → broadcast "no more connections"
//!     → SSH server stops accepting
//!     → SSH server calls ConnectionCoordinator::on_shutdown(deadline)
//!       for each live connection
//! ```
//!
//! # Design Decisions
//! - The dispatcher never reaches into live backends itself
//! - Deadlines are enforced by backends, not by this crate

pub mod shutdown;
