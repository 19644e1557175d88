//! Remote configuration client.
//!
//! # Protocol
//! ```text
//! POST <config_server.url>
//!     {"username": "...", "remoteAddress": "ip:port", "connectionId": "..."}
//! 200 OK
//!     {"config": { ...fragment merged over the base configuration... }}
//! ```
//! A missing or null `config` means "no overrides". Any non-2xx status is a
//! transport failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::schema::ConfigServerConfig;

/// Lookup keys sent to the configuration server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfigRequest {
    pub username: String,
    pub remote_address: String,
    pub connection_id: String,
}

/// Configuration server reply.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfigResponse {
    #[serde(default)]
    pub config: Option<Value>,
}

/// Errors talking to the configuration server.
#[derive(Debug, thiserror::Error)]
pub enum RemoteConfigError {
    #[error("invalid configuration server URL '{url}': {source}")]
    InvalidEndpoint { url: String, source: url::ParseError },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to configuration server failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("configuration server returned status {status}")]
    Status { status: u16 },

    #[error("failed to decode configuration server response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Source of per-connection configuration overrides.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Fetch the overrides for one connection. `Ok(None)` means none apply.
    async fn load_connection(
        &self,
        request: &ConnectionConfigRequest,
    ) -> Result<Option<Value>, RemoteConfigError>;
}

/// Client used when no configuration server is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConfigClient;

#[async_trait]
impl ConfigClient for NoopConfigClient {
    async fn load_connection(
        &self,
        _request: &ConnectionConfigRequest,
    ) -> Result<Option<Value>, RemoteConfigError> {
        Ok(None)
    }
}

/// HTTP client for the configuration server.
#[derive(Debug, Clone)]
pub struct HttpConfigClient {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpConfigClient {
    /// Build a client bound to the configured endpoint.
    ///
    /// Fails if the endpoint is not a valid URL; callers treat this as a boot
    /// failure.
    pub fn new(config: &ConfigServerConfig) -> Result<Self, RemoteConfigError> {
        let endpoint = url::Url::parse(&config.url).map_err(|source| {
            RemoteConfigError::InvalidEndpoint {
                url: config.url.clone(),
                source,
            }
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RemoteConfigError::Client)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl ConfigClient for HttpConfigClient {
    async fn load_connection(
        &self,
        request: &ConnectionConfigRequest,
    ) -> Result<Option<Value>, RemoteConfigError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(RemoteConfigError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteConfigError::Status {
                status: status.as_u16(),
            });
        }

        let body: ConnectionConfigResponse =
            resp.json().await.map_err(RemoteConfigError::Decode)?;

        tracing::debug!(
            connection_id = %request.connection_id,
            overrides = body.config.is_some(),
            "Configuration server responded"
        );

        Ok(body.config)
    }
}

/// Build the client matching the configuration: HTTP when an endpoint is
/// set, otherwise a client that never returns overrides.
pub fn client_from_config(
    config: &ConfigServerConfig,
) -> Result<std::sync::Arc<dyn ConfigClient>, RemoteConfigError> {
    if config.is_enabled() {
        Ok(std::sync::Arc::new(HttpConfigClient::new(config)?))
    } else {
        Ok(std::sync::Arc::new(NoopConfigClient))
    }
}
