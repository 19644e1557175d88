//! Root dispatcher.
//!
//! Owns everything that is shared by all connections and hands out one
//! [`ConnectionCoordinator`] per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::backend::BackendRegistry;
use crate::config::remote::{client_from_config, ConfigClient};
use crate::config::{validate_config, AppConfig, ConfigResolver, ValidationScope};
use crate::dispatch::auth::AuthDecision;
use crate::dispatch::coordinator::ConnectionCoordinator;
use crate::dispatch::error::DispatchError;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::{ConnectionId, ConnectionIdentity, ConnectionTracker};
use crate::observability::metrics::{
    Counter, MetricsSink, BACKEND_ERRORS_HELP, BACKEND_ERRORS_METRIC, BACKEND_ERRORS_UNIT, BACKEND_REQUESTS_HELP,
    BACKEND_REQUESTS_METRIC, BACKEND_REQUESTS_UNIT,
};
use crate::security::{PolicyOverlay, SecurityOverlay};

/// State shared by every coordinator.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) config: Arc<AppConfig>,
    pub(crate) resolver: ConfigResolver,
    pub(crate) registry: Arc<BackendRegistry>,
    pub(crate) overlay: Arc<dyn SecurityOverlay>,
    pub(crate) requests: Arc<dyn Counter>,
    pub(crate) errors: Arc<dyn Counter>,
    pub(crate) default_auth: AuthDecision,
}

/// Process-wide entry point of the dispatch layer.
pub struct Dispatcher {
    shared: Arc<Shared>,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl Dispatcher {
    /// Validate the boot configuration and register the backend counters.
    ///
    /// Fails if either counter is already registered with `metrics`.
    pub fn new(
        config: AppConfig,
        registry: BackendRegistry,
        metrics: &dyn MetricsSink,
        default_auth: AuthDecision,
    ) -> Result<Self, DispatchError> {
        validate_config(&config, ValidationScope::Boot)?;

        let client = client_from_config(&config.config_server)?;
        let resolver =
            ConfigResolver::new(client).with_timeout(Duration::from_secs(config.config_server.timeout_secs));

        let requests = metrics.create_counter(BACKEND_REQUESTS_METRIC, BACKEND_REQUESTS_UNIT, BACKEND_REQUESTS_HELP)?;
        let errors = metrics.create_counter(BACKEND_ERRORS_METRIC, BACKEND_ERRORS_UNIT, BACKEND_ERRORS_HELP)?;

        tracing::info!(
            backend = %config.backend,
            registered = ?registry.registered(),
            config_server = config.config_server.is_enabled(),
            security = config.security.enabled,
            default_auth = %default_auth,
            "Dispatcher initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config: Arc::new(config),
                resolver,
                registry: Arc::new(registry),
                overlay: Arc::new(PolicyOverlay),
                requests,
                errors,
                default_auth,
            }),
            tracker: ConnectionTracker::new(),
            shutdown: Shutdown::new(),
        })
    }

    /// Replace the security overlay.
    pub fn with_overlay(mut self, overlay: Arc<dyn SecurityOverlay>) -> Self {
        Arc::make_mut(&mut self.shared).overlay = overlay;
        self
    }

    /// Replace the configuration server client, keeping the lookup bound.
    pub fn with_config_client(mut self, client: Arc<dyn ConfigClient>) -> Self {
        let shared = Arc::make_mut(&mut self.shared);
        let timeout = shared.resolver.timeout();
        shared.resolver = ConfigResolver::new(client).with_timeout(timeout);
        self
    }

    /// Override the connection configuration lookup bound.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        let shared = Arc::make_mut(&mut self.shared);
        shared.resolver = shared.resolver.clone().with_timeout(timeout);
        self
    }

    /// Create the coordinator for a freshly accepted connection.
    pub fn accept_connection(&self, remote_addr: SocketAddr, connection_id: ConnectionId) -> ConnectionCoordinator {
        let span = tracing::info_span!(
            "connection",
            connection_id = %connection_id,
            remote_addr = %remote_addr,
        );
        tracing::debug!(parent: &span, "Connection accepted");

        let guard = self.tracker.track(connection_id.clone());
        ConnectionCoordinator::new(
            Arc::clone(&self.shared),
            ConnectionIdentity::new(remote_addr, connection_id),
            span,
            guard,
        )
    }

    /// Tell accept loops to stop. Live connections are notified by the SSH
    /// layer through [`ConnectionCoordinator::on_shutdown`].
    pub fn shutdown(&self, deadline: Instant) -> usize {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let notified = self.shutdown.trigger();
        tracing::info!(
            active_connections = self.tracker.active_count(),
            listeners = notified,
            remaining_ms = remaining.as_millis() as u64,
            "Shutdown requested"
        );
        notified
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Number of coordinators that have not been dropped yet.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Wait until every coordinator has been dropped.
    pub async fn wait_for_drain(&self) {
        self.tracker.wait_for_drain().await;
    }

    pub fn config(&self) -> &AppConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.shared.registry
    }

    pub fn default_auth(&self) -> AuthDecision {
        self.shared.default_auth
    }

    /// Resolve the configuration a connection would run with, without
    /// building a backend.
    pub async fn preview_connection_config(
        &self,
        username: &str,
        remote_addr: SocketAddr,
        connection_id: &ConnectionId,
    ) -> Result<AppConfig, DispatchError> {
        self.shared
            .resolver
            .resolve(&self.shared.config, username, remote_addr, connection_id)
            .await
            .map_err(|e| DispatchError::resolve(connection_id, e))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("backend", &self.shared.config.backend)
            .field("registry", &self.shared.registry)
            .field("default_auth", &self.shared.default_auth)
            .field("active_connections", &self.tracker.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::{InMemorySink, MetricsError};

    fn config() -> AppConfig {
        AppConfig {
            backend: "docker".into(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn invalid_boot_config_is_rejected() {
        let sink = InMemorySink::new();
        let config = AppConfig {
            backend: "podman".into(),
            ..AppConfig::default()
        };
        let err = Dispatcher::new(config, BackendRegistry::new(), &sink, AuthDecision::Granted).unwrap_err();
        assert!(matches!(err, DispatchError::ConfigValidation(_)));
    }

    #[test]
    fn counters_cannot_be_registered_twice() {
        let sink = InMemorySink::new();
        Dispatcher::new(config(), BackendRegistry::new(), &sink, AuthDecision::Granted).unwrap();
        let err = Dispatcher::new(config(), BackendRegistry::new(), &sink, AuthDecision::Granted).unwrap_err();
        assert!(matches!(err, DispatchError::Metrics(MetricsError::Duplicate(_))));
    }

    #[test]
    fn coordinators_are_tracked_until_dropped() {
        let sink = InMemorySink::new();
        let dispatcher = Dispatcher::new(config(), BackendRegistry::new(), &sink, AuthDecision::Granted).unwrap();

        let first = dispatcher.accept_connection("127.0.0.1:4000".parse().unwrap(), "a".into());
        let second = dispatcher.accept_connection("127.0.0.1:4001".parse().unwrap(), "b".into());
        assert_eq!(dispatcher.active_connections(), 2);
        assert_eq!(first.identity().connection_id.as_str(), "a");
        assert!(first.identity().username.is_none());

        drop(first);
        drop(second);
        assert_eq!(dispatcher.active_connections(), 0);
    }

    #[tokio::test]
    async fn shutdown_reaches_subscribers() {
        let sink = InMemorySink::new();
        let dispatcher = Dispatcher::new(config(), BackendRegistry::new(), &sink, AuthDecision::Granted).unwrap();
        let mut rx = dispatcher.subscribe_shutdown();

        assert_eq!(dispatcher.shutdown(Instant::now() + Duration::from_secs(5)), 1);
        rx.recv().await.unwrap();
    }
}
