//! Backend selector values.

use std::fmt;
use std::str::FromStr;

use crate::config::{AppConfig, BackendSettings};

/// The closed set of backend kinds a connection can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendName {
    /// Container per connection via the Docker API.
    Docker,
    /// Legacy container-per-session Docker backend.
    DockerRun,
    /// Pod per connection on Kubernetes.
    Kubernetes,
    /// Legacy pod-per-session Kubernetes backend.
    KubeRun,
    /// Relay to an upstream SSH server.
    SshProxy,
}

impl BackendName {
    pub const ALL: [BackendName; 5] = [
        BackendName::Docker,
        BackendName::DockerRun,
        BackendName::Kubernetes,
        BackendName::KubeRun,
        BackendName::SshProxy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendName::Docker => "docker",
            BackendName::DockerRun => "dockerrun",
            BackendName::Kubernetes => "kubernetes",
            BackendName::KubeRun => "kuberun",
            BackendName::SshProxy => "sshproxy",
        }
    }

    /// The configuration section owned by this backend.
    pub fn settings<'a>(&self, config: &'a AppConfig) -> &'a BackendSettings {
        match self {
            BackendName::Docker => &config.docker,
            BackendName::DockerRun => &config.dockerrun,
            BackendName::Kubernetes => &config.kubernetes,
            BackendName::KubeRun => &config.kuberun,
            BackendName::SshProxy => &config.sshproxy,
        }
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend: {0}")]
pub struct InvalidBackendName(pub String);

impl FromStr for BackendName {
    type Err = InvalidBackendName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| InvalidBackendName(s.to_string()))
    }
}
