//! Errors surfaced to the SSH protocol layer.

use crate::backend::{BackendError, FactoryError};
use crate::config::remote::RemoteConfigError;
use crate::config::{ResolveError, ValidationErrors};
use crate::net::connection::ConnectionId;
use crate::observability::metrics::MetricsError;
use crate::security::PolicyError;

/// Every failure the dispatcher reports.
///
/// Boot failures carry no connection; per-connection failures name the
/// connection and, where known, the backend kind. The SSH layer is expected
/// to close the connection on any of them.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    ConfigValidation(#[from] ValidationErrors),

    #[error("failed to create configuration server client: {0}")]
    ConfigServer(#[from] RemoteConfigError),

    #[error("failed to register backend metrics: {0}")]
    Metrics(#[from] MetricsError),

    #[error("connection {connection_id}: timed out after {timeout_secs}s loading connection-specific configuration")]
    RemoteConfigTimeout {
        connection_id: ConnectionId,
        timeout_secs: u64,
    },

    #[error("connection {connection_id}: failed to load connection-specific configuration: {source}")]
    RemoteConfigTransport {
        connection_id: ConnectionId,
        source: RemoteConfigError,
    },

    #[error("connection {connection_id}: failed to apply connection-specific configuration: {source}")]
    RemoteConfigMerge {
        connection_id: ConnectionId,
        source: serde_json::Error,
    },

    #[error("connection {connection_id}: configuration server returned invalid configuration: {source}")]
    InvalidRemoteConfig {
        connection_id: ConnectionId,
        source: ValidationErrors,
    },

    #[error("connection {connection_id}: {reason}")]
    UnknownBackend {
        connection_id: ConnectionId,
        backend: String,
        reason: String,
    },

    #[error("connection {connection_id}: failed to create {backend} backend: {source}")]
    BackendConstruction {
        connection_id: ConnectionId,
        backend: String,
        source: BackendError,
    },

    #[error("connection {connection_id}: failed to apply security policy to {backend} backend: {source}")]
    PolicyConfig {
        connection_id: ConnectionId,
        backend: String,
        source: PolicyError,
    },

    #[error("connection {connection_id}: the backend handler does not support authentication")]
    AuthenticationUnavailable { connection_id: ConnectionId },

    #[error("connection {connection_id}: disconnected before the backend was ready")]
    ConnectionClosed { connection_id: ConnectionId },

    #[error("connection {connection_id}: handshake already completed")]
    DuplicateHandshake { connection_id: ConnectionId },

    #[error(transparent)]
    Handshake(BackendError),
}

impl DispatchError {
    pub(crate) fn resolve(connection_id: &ConnectionId, err: ResolveError) -> Self {
        let connection_id = connection_id.clone();
        match err {
            ResolveError::Timeout(timeout) => DispatchError::RemoteConfigTimeout {
                connection_id,
                timeout_secs: timeout.as_secs(),
            },
            ResolveError::Transport(source) => DispatchError::RemoteConfigTransport { connection_id, source },
            ResolveError::Merge(source) => DispatchError::RemoteConfigMerge { connection_id, source },
            ResolveError::InvalidConfig(source) => DispatchError::InvalidRemoteConfig { connection_id, source },
        }
    }

    pub(crate) fn factory(connection_id: &ConnectionId, err: FactoryError) -> Self {
        let connection_id = connection_id.clone();
        match err {
            FactoryError::UnknownBackend(ref backend) => DispatchError::UnknownBackend {
                connection_id,
                backend: backend.clone(),
                reason: err.to_string(),
            },
            FactoryError::NotRegistered(backend) => DispatchError::UnknownBackend {
                connection_id,
                backend: backend.to_string(),
                reason: err.to_string(),
            },
            FactoryError::Construction { backend, source } => DispatchError::BackendConstruction {
                connection_id,
                backend: backend.to_string(),
                source,
            },
        }
    }

    /// Connection this error belongs to, if any.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            DispatchError::RemoteConfigTimeout { connection_id, .. }
            | DispatchError::RemoteConfigTransport { connection_id, .. }
            | DispatchError::RemoteConfigMerge { connection_id, .. }
            | DispatchError::InvalidRemoteConfig { connection_id, .. }
            | DispatchError::UnknownBackend { connection_id, .. }
            | DispatchError::BackendConstruction { connection_id, .. }
            | DispatchError::PolicyConfig { connection_id, .. }
            | DispatchError::AuthenticationUnavailable { connection_id }
            | DispatchError::ConnectionClosed { connection_id }
            | DispatchError::DuplicateHandshake { connection_id } => Some(connection_id),
            DispatchError::ConfigValidation(_)
            | DispatchError::ConfigServer(_)
            | DispatchError::Metrics(_)
            | DispatchError::Handshake(_) => None,
        }
    }
}
