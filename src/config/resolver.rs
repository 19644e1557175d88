//! Connection-scoped configuration resolution.
//!
//! ```text
//! base AppConfig (shared, read-only)
//!     → clone (private to the connection)
//!     → ConfigClient::load_connection (bounded by 60s)
//!     → merge overrides into the clone
//!     → validate with connection-scope rules
//!     → AppConfig for this connection only
//! ```
//!
//! A single attempt is made per handshake. On any failure the clone is
//! dropped; the base configuration is never used as a fallback.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::remote::{ConfigClient, ConnectionConfigRequest, RemoteConfigError};
use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationErrors, ValidationScope};
use crate::net::connection::ConnectionId;

/// Upper bound on a single configuration lookup.
pub const CONNECTION_CONFIG_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a connection-specific configuration could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("timed out after {}s waiting for connection-specific configuration", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to load connection-specific configuration: {0}")]
    Transport(#[source] RemoteConfigError),

    #[error("failed to apply configuration server overrides: {0}")]
    Merge(#[source] serde_json::Error),

    #[error("configuration server returned invalid configuration: {0}")]
    InvalidConfig(#[source] ValidationErrors),
}

/// Produces per-connection configurations.
#[derive(Clone)]
pub struct ConfigResolver {
    client: Arc<dyn ConfigClient>,
    timeout: Duration,
}

impl ConfigResolver {
    pub fn new(client: Arc<dyn ConfigClient>) -> Self {
        Self {
            client,
            timeout: CONNECTION_CONFIG_TIMEOUT,
        }
    }

    /// Override the lookup bound. Never exceeds [`CONNECTION_CONFIG_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(CONNECTION_CONFIG_TIMEOUT);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the configuration for one authenticated connection.
    pub async fn resolve(
        &self,
        base: &AppConfig,
        username: &str,
        remote_addr: SocketAddr,
        connection_id: &ConnectionId,
    ) -> Result<AppConfig, ResolveError> {
        let mut config = base.clone();

        let request = ConnectionConfigRequest {
            username: username.to_string(),
            remote_address: remote_addr.to_string(),
            connection_id: connection_id.to_string(),
        };

        let overrides = match tokio::time::timeout(self.timeout, self.client.load_connection(&request)).await {
            Ok(Ok(overrides)) => overrides,
            Ok(Err(e)) => {
                tracing::error!(
                    connection_id = %connection_id,
                    username = %username,
                    remote_addr = %remote_addr,
                    error = %e,
                    "Failed to load connection-specific configuration"
                );
                return Err(ResolveError::Transport(e));
            }
            Err(_) => {
                tracing::error!(
                    connection_id = %connection_id,
                    username = %username,
                    remote_addr = %remote_addr,
                    timeout_secs = self.timeout.as_secs(),
                    "Timed out loading connection-specific configuration"
                );
                return Err(ResolveError::Timeout(self.timeout));
            }
        };

        if let Some(overrides) = overrides {
            config = apply_overrides(&config, overrides).map_err(|e| {
                tracing::error!(
                    connection_id = %connection_id,
                    username = %username,
                    error = %e,
                    "Configuration server returned overrides that do not fit the schema"
                );
                ResolveError::Merge(e)
            })?;
        }

        if let Err(e) = validate_config(&config, ValidationScope::Connection) {
            tracing::error!(
                connection_id = %connection_id,
                username = %username,
                remote_addr = %remote_addr,
                error = %e,
                "Configuration server returned invalid configuration"
            );
            return Err(ResolveError::InvalidConfig(e));
        }

        Ok(config)
    }
}

/// Merge a JSON fragment over a configuration.
pub fn apply_overrides(config: &AppConfig, overrides: Value) -> Result<AppConfig, serde_json::Error> {
    let mut merged = serde_json::to_value(config)?;
    merge_value(&mut merged, overrides);
    serde_json::from_value(merged)
}

/// Objects merge key by key; everything else replaces the target.
fn merge_value(target: &mut Value, overrides: Value) {
    match (target, overrides) {
        (Value::Object(target), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match target.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, overrides) => *target = overrides,
    }
}
