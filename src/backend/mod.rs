//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! Handshake succeeded, connection config resolved
//!     → name.rs (parse the selector into a BackendName)
//!     → registry.rs (look up the constructor, label logger + counters)
//!     → constructor builds an Arc<dyn BackendHandler>
//!     → security overlay may wrap it
//!     → coordinator stores it and forwards lifecycle events
//! ```
//!
//! # Design Decisions
//! - Backends are external; this crate only defines the contract
//! - One contract for every backend and for the overlay, so the coordinator
//!   cannot tell them apart
//! - Adding a backend means registering a constructor

pub mod name;
pub mod registry;

use std::fmt;

use async_trait::async_trait;
use tokio::time::Instant;

pub use name::{BackendName, InvalidBackendName};
pub use registry::{BackendConstructor, BackendContext, BackendRegistry, FactoryError};

/// Session channel identifier assigned by the SSH layer.
pub type ChannelId = u64;

/// A request arriving on a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Env { name: String, value: String },
    Exec { program: String },
    Shell,
    Subsystem { name: String },
}

impl SessionRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionRequest::Env { .. } => "env",
            SessionRequest::Exec { .. } => "exec",
            SessionRequest::Shell => "shell",
            SessionRequest::Subsystem { .. } => "subsystem",
        }
    }
}

/// Failure reported by a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    pub fn msg(message: impl Into<String>) -> Self {
        BackendError::Message(message.into())
    }
}

/// Failure handling a session request.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{kind} request rejected by security policy")]
    Rejected { kind: &'static str },

    #[error("session limit of {0} reached")]
    LimitReached(u32),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Lifecycle callbacks every backend implements.
#[async_trait]
pub trait BackendHandler: Send + Sync {
    /// Authentication finished; start servicing `username`.
    async fn on_handshake_success(&self, username: &str) -> Result<Box<dyn SessionHandler>, BackendError>;

    /// The client went away. Release everything.
    async fn on_disconnect(&self);

    /// The process is stopping; finish before `deadline`.
    async fn on_shutdown(&self, deadline: Instant);
}

/// Per-session request handling returned by a successful handshake.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn on_request(&self, channel: ChannelId, request: SessionRequest) -> Result<(), SessionError>;

    async fn on_channel_close(&self, channel: ChannelId);
}

impl fmt::Debug for dyn BackendHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackendHandler")
    }
}

impl fmt::Debug for dyn SessionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandler")
    }
}
