//! Security overlay subsystem.
//!
//! # Data Flow
//! ```text
//! Backend constructed for a connection:
//!     → policy.rs (validate SecurityConfig, fail the handshake if malformed)
//!     → overlay.rs (decorate the backend with the same handler contract)
//!
//! Session request on the wrapped backend:
//!     → policy.rs decides allow/deny per request type
//!     → overlay.rs enforces the session limit
//!     → backend sees only admitted requests
//! ```
//!
//! # Design Decisions
//! - Fail closed: a policy that cannot be built never yields an unwrapped backend
//! - The coordinator cannot tell a wrapped backend from a bare one

pub mod overlay;
pub mod policy;

pub use overlay::{PolicyOverlay, SecurityOverlay};
pub use policy::{Decision, Policy, PolicyError};
