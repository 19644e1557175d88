//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and coordinators produce:
//!     → logging.rs (structured log events, per-connection spans)
//!     → metrics.rs (backend request/error counters)
//!
//! Consumers:
//!     → Log aggregation (stdout, text or JSON)
//!     → Whatever `metrics` recorder the host process installs
//! ```
//!
//! # Design Decisions
//! - Spans carry connection_id, remote_addr, username and backend
//! - Counters are injected capabilities, never globals
//! - Counter updates are cheap (atomic or sharded increments)

pub mod logging;
pub mod metrics;
