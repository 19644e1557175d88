//! Per-connection lifecycle coordinator.
//!
//! # State Machine
//! ```text
//! Connected → Authenticating → HandshakeComplete → Disconnected
//!     │              │                 │
//!     └──────────────┴─────────────────┴──→ Disconnected (terminal)
//!
//! shutting_down: orthogonal flag, settable in any phase. The deadline is
//! kept so a backend stored later still receives it.
//! ```
//!
//! # Locking
//! The backend slot is the only locked state. Every access follows
//! lock → snapshot → unlock → act: the lock is never held while a backend
//! callback runs, so a slow shutdown cannot starve a disconnect.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;
use tracing::Span;

use crate::backend::{BackendHandler, SessionHandler};
use crate::dispatch::auth::AuthDecision;
use crate::dispatch::dispatcher::Shared;
use crate::dispatch::error::DispatchError;
use crate::net::connection::{ConnectionGuard, ConnectionIdentity};

/// Primary lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connected,
    Authenticating,
    HandshakeComplete,
    Disconnected,
}

struct ConnectionState {
    phase: ConnectionPhase,
    shutdown_deadline: Option<Instant>,
    backend: Option<Arc<dyn BackendHandler>>,
}

/// Drives one connection from accept to teardown.
///
/// All callbacks take `&self`; share the coordinator behind an `Arc` when
/// disconnect and shutdown notifications come from different tasks.
pub struct ConnectionCoordinator {
    shared: Arc<Shared>,
    identity: ConnectionIdentity,
    span: Span,
    state: Mutex<ConnectionState>,
    _guard: ConnectionGuard,
}

impl ConnectionCoordinator {
    pub(crate) fn new(shared: Arc<Shared>, identity: ConnectionIdentity, span: Span, guard: ConnectionGuard) -> Self {
        Self {
            shared,
            identity,
            span,
            state: Mutex::new(ConnectionState {
                phase: ConnectionPhase::Connected,
                shutdown_deadline: None,
                backend: None,
            }),
            _guard: guard,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.lock_state().phase
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock_state().shutdown_deadline.is_some()
    }

    /// Whether a backend is currently held.
    pub fn has_backend(&self) -> bool {
        self.lock_state().backend.is_some()
    }

    pub fn on_auth_password(&self, username: &str, _password: &[u8]) -> Result<AuthDecision, DispatchError> {
        self.auth_response("password", username)
    }

    pub fn on_auth_pubkey(&self, username: &str, _public_key: &str) -> Result<AuthDecision, DispatchError> {
        self.auth_response("publickey", username)
    }

    fn auth_response(&self, method: &'static str, username: &str) -> Result<AuthDecision, DispatchError> {
        {
            let mut state = self.lock_state();
            if state.phase == ConnectionPhase::Connected {
                state.phase = ConnectionPhase::Authenticating;
            }
        }

        let decision = self.shared.default_auth;
        tracing::debug!(parent: &self.span, method, username, decision = %decision, "Authentication attempt");

        match decision {
            AuthDecision::Unavailable => Err(DispatchError::AuthenticationUnavailable {
                connection_id: self.identity.connection_id.clone(),
            }),
            decision => Ok(decision),
        }
    }

    /// Telemetry hook; the connection is about to be closed by the SSH layer.
    pub fn on_handshake_failed(&self, reason: &dyn fmt::Display) {
        tracing::info!(parent: &self.span, reason = %reason, "Handshake failed");
    }

    /// Resolve configuration, build the backend and hand the handshake to it.
    pub async fn on_handshake_success(&self, username: &str) -> Result<Box<dyn SessionHandler>, DispatchError> {
        let connection_id = &self.identity.connection_id;
        let shared = &self.shared;

        let config = shared
            .resolver
            .resolve(&shared.config, username, self.identity.remote_addr, connection_id)
            .await
            .map_err(|e| DispatchError::resolve(connection_id, e))?;

        let span = tracing::info_span!(parent: &self.span, "session", username = %username);
        let identity = self.identity.authenticated(username);

        let backend = shared
            .registry
            .construct(&config, &identity, &span, &shared.requests, &shared.errors)
            .map_err(|e| {
                let err = DispatchError::factory(connection_id, e);
                tracing::error!(parent: &span, error = %err, "Backend construction failed");
                err
            })?;

        let backend = if config.security.enabled {
            shared
                .overlay
                .wrap(&config.security, backend, &span)
                .map_err(|source| {
                    tracing::error!(parent: &span, backend = %config.backend, error = %source, "Security overlay rejected configuration");
                    DispatchError::PolicyConfig {
                        connection_id: connection_id.clone(),
                        backend: config.backend.clone(),
                        source,
                    }
                })?
        } else {
            backend
        };

        let stored = {
            let mut state = self.lock_state();
            let phase = state.phase;
            match phase {
                ConnectionPhase::Disconnected => Err(DispatchError::ConnectionClosed {
                    connection_id: connection_id.clone(),
                }),
                _ if state.backend.is_some() => Err(DispatchError::DuplicateHandshake {
                    connection_id: connection_id.clone(),
                }),
                _ => {
                    state.backend = Some(Arc::clone(&backend));
                    state.phase = ConnectionPhase::HandshakeComplete;
                    Ok(state.shutdown_deadline)
                }
            }
        };

        let pending_shutdown = match stored {
            Ok(deadline) => deadline,
            // The unstored backend never saw a handshake; release it here.
            Err(err) => {
                tracing::debug!(parent: &span, error = %err, "Discarding backend that will not be used");
                backend.on_disconnect().await;
                return Err(err);
            }
        };

        // Shutdown arrived while the backend was being built.
        if let Some(deadline) = pending_shutdown {
            tracing::debug!(parent: &span, "Forwarding shutdown received during handshake");
            backend.on_shutdown(deadline).await;
        }

        tracing::info!(parent: &span, backend = %config.backend, "Backend ready");

        backend
            .on_handshake_success(username)
            .await
            .map_err(DispatchError::Handshake)
    }

    /// Release the backend. Calling this again is a no-op.
    pub async fn on_disconnect(&self) {
        let backend = {
            let mut state = self.lock_state();
            state.phase = ConnectionPhase::Disconnected;
            state.backend.take()
        };

        if let Some(backend) = backend {
            backend.on_disconnect().await;
            tracing::debug!(parent: &self.span, "Backend disconnected");
        }
    }

    /// Forward a shutdown deadline to the backend, if one is held.
    pub async fn on_shutdown(&self, deadline: Instant) {
        let backend = {
            let mut state = self.lock_state();
            state.shutdown_deadline = Some(match state.shutdown_deadline {
                Some(earlier) => earlier.min(deadline),
                None => deadline,
            });
            state.backend.clone()
        };

        match backend {
            Some(backend) => backend.on_shutdown(deadline).await,
            None => tracing::debug!(parent: &self.span, "Shutdown with no backend attached"),
        }
    }
}

impl fmt::Debug for ConnectionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ConnectionCoordinator")
            .field("identity", &self.identity)
            .field("phase", &state.phase)
            .field("shutdown_deadline", &state.shutdown_deadline)
            .field("has_backend", &state.backend.is_some())
            .finish()
    }
}
