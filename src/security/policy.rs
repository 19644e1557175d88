//! Request policy evaluation.
//!
//! # Responsibilities
//! - Validate a [`SecurityConfig`] before it is trusted
//! - Resolve `inherit` modes against the default mode
//! - Decide whether a session request may reach the backend

use crate::backend::SessionRequest;
use crate::config::{PolicyMode, RequestPolicy, SecurityConfig};

/// The policy cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("security.default_mode cannot be \"inherit\"")]
    InheritedDefault,

    #[error("security.{section}: filter mode requires a non-empty allow list")]
    EmptyAllowList { section: &'static str },

    #[error("security.{section}: allow list contains an empty entry")]
    EmptyAllowEntry { section: &'static str },

    #[error("security.shell: filter mode is not supported for shell requests")]
    ShellFilter,

    #[error("security.max_sessions must be greater than zero")]
    ZeroSessions,

    #[error("{0}")]
    Invalid(String),
}

/// Outcome for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// A validated security policy.
#[derive(Debug, Clone)]
pub struct Policy {
    env: Rule,
    exec: Rule,
    shell: Rule,
    subsystem: Rule,
    max_sessions: Option<u32>,
}

#[derive(Debug, Clone)]
enum Rule {
    Enable,
    Filter(Vec<String>),
    Disable,
}

impl Rule {
    fn decide(&self, value: &str) -> Decision {
        match self {
            Rule::Enable => Decision::Allow,
            Rule::Filter(allow) if allow.iter().any(|a| a == value) => Decision::Allow,
            Rule::Filter(_) | Rule::Disable => Decision::Deny,
        }
    }
}

impl Policy {
    pub fn new(config: &SecurityConfig) -> Result<Self, PolicyError> {
        if config.default_mode == PolicyMode::Inherit {
            return Err(PolicyError::InheritedDefault);
        }
        if config.max_sessions == Some(0) {
            return Err(PolicyError::ZeroSessions);
        }
        if config.shell.mode == PolicyMode::Filter {
            return Err(PolicyError::ShellFilter);
        }

        let shell = match rule("shell", &config.shell, config.default_mode)? {
            // Nothing to match a shell request against.
            Rule::Filter(_) => Rule::Disable,
            other => other,
        };

        Ok(Self {
            env: rule("env", &config.env, config.default_mode)?,
            exec: rule("exec", &config.exec, config.default_mode)?,
            shell,
            subsystem: rule("subsystem", &config.subsystem, config.default_mode)?,
            max_sessions: config.max_sessions,
        })
    }

    pub fn check(&self, request: &SessionRequest) -> Decision {
        match request {
            SessionRequest::Env { name, .. } => self.env.decide(name),
            SessionRequest::Exec { program } => self.exec.decide(program),
            SessionRequest::Shell => self.shell.decide(""),
            SessionRequest::Subsystem { name } => self.subsystem.decide(name),
        }
    }

    pub fn max_sessions(&self) -> Option<u32> {
        self.max_sessions
    }
}

fn rule(section: &'static str, policy: &RequestPolicy, default_mode: PolicyMode) -> Result<Rule, PolicyError> {
    let mode = match policy.mode {
        PolicyMode::Inherit => default_mode,
        mode => mode,
    };

    match mode {
        PolicyMode::Enable | PolicyMode::Inherit => Ok(Rule::Enable),
        PolicyMode::Disable => Ok(Rule::Disable),
        PolicyMode::Filter if section == "shell" => Ok(Rule::Filter(Vec::new())),
        PolicyMode::Filter => {
            if policy.allow.is_empty() {
                return Err(PolicyError::EmptyAllowList { section });
            }
            if policy.allow.iter().any(|entry| entry.trim().is_empty()) {
                return Err(PolicyError::EmptyAllowEntry { section });
            }
            Ok(Rule::Filter(policy.allow.clone()))
        }
    }
}
