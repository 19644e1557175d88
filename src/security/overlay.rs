//! Policy-enforcing decorator around a backend.
//!
//! The wrapped handler implements the same [`BackendHandler`] contract as the
//! backend it decorates. Lifecycle calls pass straight through; session
//! requests are checked against the policy first.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::Span;

use crate::backend::{BackendError, BackendHandler, ChannelId, SessionError, SessionHandler, SessionRequest};
use crate::config::SecurityConfig;
use crate::security::policy::{Decision, Policy, PolicyError};

/// Wraps constructed backends.
pub trait SecurityOverlay: Send + Sync {
    fn wrap(
        &self,
        config: &SecurityConfig,
        backend: Arc<dyn BackendHandler>,
        span: &Span,
    ) -> Result<Arc<dyn BackendHandler>, PolicyError>;
}

/// Overlay enforcing [`SecurityConfig`] request policies.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyOverlay;

impl SecurityOverlay for PolicyOverlay {
    fn wrap(
        &self,
        config: &SecurityConfig,
        backend: Arc<dyn BackendHandler>,
        span: &Span,
    ) -> Result<Arc<dyn BackendHandler>, PolicyError> {
        let policy = Arc::new(Policy::new(config)?);
        Ok(Arc::new(SecuredBackend {
            backend,
            policy,
            span: span.clone(),
        }))
    }
}

struct SecuredBackend {
    backend: Arc<dyn BackendHandler>,
    policy: Arc<Policy>,
    span: Span,
}

#[async_trait]
impl BackendHandler for SecuredBackend {
    async fn on_handshake_success(&self, username: &str) -> Result<Box<dyn SessionHandler>, BackendError> {
        let session = self.backend.on_handshake_success(username).await?;
        Ok(Box::new(SecuredSession {
            session,
            policy: Arc::clone(&self.policy),
            channels: Mutex::new(HashSet::new()),
            span: self.span.clone(),
        }))
    }

    async fn on_disconnect(&self) {
        self.backend.on_disconnect().await;
    }

    async fn on_shutdown(&self, deadline: Instant) {
        self.backend.on_shutdown(deadline).await;
    }
}

struct SecuredSession {
    session: Box<dyn SessionHandler>,
    policy: Arc<Policy>,
    channels: Mutex<HashSet<ChannelId>>,
    span: Span,
}

impl SecuredSession {
    fn admit_channel(&self, channel: ChannelId) -> Result<(), SessionError> {
        let Some(limit) = self.policy.max_sessions() else {
            return Ok(());
        };
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if channels.contains(&channel) {
            return Ok(());
        }
        if channels.len() >= limit as usize {
            return Err(SessionError::LimitReached(limit));
        }
        channels.insert(channel);
        Ok(())
    }
}

#[async_trait]
impl SessionHandler for SecuredSession {
    async fn on_request(&self, channel: ChannelId, request: SessionRequest) -> Result<(), SessionError> {
        let kind = request.kind();
        if self.policy.check(&request) == Decision::Deny {
            tracing::warn!(parent: &self.span, channel, request = kind, "Request rejected by security policy");
            return Err(SessionError::Rejected { kind });
        }
        if let Err(e) = self.admit_channel(channel) {
            tracing::warn!(parent: &self.span, channel, error = %e, "Session limit reached");
            return Err(e);
        }
        self.session.on_request(channel, request).await
    }

    async fn on_channel_close(&self, channel: ChannelId) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&channel);
        self.session.on_channel_close(channel).await;
    }
}
