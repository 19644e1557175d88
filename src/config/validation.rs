//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Backend selector must name a known backend
//! - Validate the configuration server endpoint and timeout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: (AppConfig, ValidationScope) → Result<(), ValidationErrors>
//! - Connection scope is stricter than boot scope: at boot the selector may be
//!   left empty when a configuration server is expected to supply it
//! - Security policy is checked by the overlay when it wraps a backend

use std::fmt;

use crate::backend::BackendName;
use crate::config::resolver::CONNECTION_CONFIG_TIMEOUT;
use crate::config::schema::AppConfig;

/// Which rule set to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationScope {
    /// Base configuration at process start.
    Boot,
    /// Per-connection configuration after remote overrides were merged.
    Connection,
}

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All validation errors found in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a configuration under the given scope.
pub fn validate_config(config: &AppConfig, scope: ValidationScope) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    validate_backend(config, scope, &mut errors);

    if config.config_server.is_enabled() {
        if let Err(e) = url::Url::parse(&config.config_server.url) {
            errors.push(ValidationError::new(
                "config_server.url",
                format!("invalid URL '{}': {}", config.config_server.url, e),
            ));
        }
        let timeout_secs = config.config_server.timeout_secs;
        if timeout_secs == 0 {
            errors.push(ValidationError::new(
                "config_server.timeout_secs",
                "must be greater than zero",
            ));
        } else if timeout_secs > CONNECTION_CONFIG_TIMEOUT.as_secs() {
            errors.push(ValidationError::new(
                "config_server.timeout_secs",
                format!("must not exceed {}", CONNECTION_CONFIG_TIMEOUT.as_secs()),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn validate_backend(config: &AppConfig, scope: ValidationScope, errors: &mut Vec<ValidationError>) {
    if config.backend.is_empty() {
        let deferred = scope == ValidationScope::Boot && config.config_server.is_enabled();
        if !deferred {
            errors.push(ValidationError::new("backend", "no backend selected"));
        }
        return;
    }

    if config.backend.parse::<BackendName>().is_err() {
        errors.push(ValidationError::new(
            "backend",
            format!("invalid backend: {}", config.backend),
        ));
    }
}
