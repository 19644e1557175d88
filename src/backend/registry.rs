//! Backend factory.
//!
//! # Responsibilities
//! - Map each [`BackendName`] to exactly one constructor
//! - Hand every constructor the same [`BackendContext`] shape
//! - Label the logger span and both counters with the backend kind
//!
//! The factory never increments counters; backends do.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing::Span;

use crate::backend::{BackendError, BackendHandler, BackendName};
use crate::config::{AppConfig, BackendSettings};
use crate::net::connection::{ConnectionId, ConnectionIdentity};
use crate::observability::metrics::{Counter, BACKEND_LABEL};

/// Everything a backend constructor receives besides its own settings.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub remote_addr: SocketAddr,
    pub connection_id: ConnectionId,
    /// Span labeled with `backend=<kind>`.
    pub span: Span,
    /// Log level in effect for this connection.
    pub log_level: LevelFilter,
    /// Request counter labeled with `backend=<kind>`.
    pub requests: Arc<dyn Counter>,
    /// Error counter labeled with `backend=<kind>`.
    pub errors: Arc<dyn Counter>,
}

/// Builds one backend handler per connection.
pub trait BackendConstructor: Send + Sync {
    fn construct(
        &self,
        ctx: BackendContext,
        settings: &BackendSettings,
    ) -> Result<Arc<dyn BackendHandler>, BackendError>;
}

impl<F> BackendConstructor for F
where
    F: Fn(BackendContext, &BackendSettings) -> Result<Arc<dyn BackendHandler>, BackendError> + Send + Sync,
{
    fn construct(
        &self,
        ctx: BackendContext,
        settings: &BackendSettings,
    ) -> Result<Arc<dyn BackendHandler>, BackendError> {
        self(ctx, settings)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("invalid backend: {0}")]
    UnknownBackend(String),

    #[error("no constructor registered for backend {0}")]
    NotRegistered(BackendName),

    #[error("failed to create {backend} backend: {source}")]
    Construction {
        backend: BackendName,
        source: BackendError,
    },
}

/// Static table from backend name to constructor, built once at startup.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    constructors: HashMap<BackendName, Arc<dyn BackendConstructor>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register<C>(mut self, name: BackendName, constructor: C) -> Self
    where
        C: BackendConstructor + 'static,
    {
        self.constructors.insert(name, Arc::new(constructor));
        self
    }

    pub fn is_registered(&self, name: BackendName) -> bool {
        self.constructors.contains_key(&name)
    }

    /// Registered names in a stable order.
    pub fn registered(&self) -> Vec<BackendName> {
        let mut names: Vec<_> = self.constructors.keys().copied().collect();
        names.sort();
        names
    }

    /// Build the backend selected by `config`.
    pub fn construct(
        &self,
        config: &AppConfig,
        identity: &ConnectionIdentity,
        span: &Span,
        requests: &Arc<dyn Counter>,
        errors: &Arc<dyn Counter>,
    ) -> Result<Arc<dyn BackendHandler>, FactoryError> {
        let name: BackendName = config
            .backend
            .parse()
            .map_err(|_| FactoryError::UnknownBackend(config.backend.clone()))?;

        let constructor = self
            .constructors
            .get(&name)
            .ok_or(FactoryError::NotRegistered(name))?;

        let ctx = BackendContext {
            remote_addr: identity.remote_addr,
            connection_id: identity.connection_id.clone(),
            span: tracing::info_span!(parent: span, "backend", backend = name.as_str()),
            log_level: config.log.level.into(),
            requests: requests.with_label(BACKEND_LABEL, name.as_str()),
            errors: errors.with_label(BACKEND_LABEL, name.as_str()),
        };

        constructor
            .construct(ctx, name.settings(config))
            .map_err(|source| FactoryError::Construction { backend: name, source })
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}
