//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (boot-scope semantic checks)
//!     → AppConfig (immutable, shared via Arc by the dispatcher)
//!
//! Per connection, after the handshake:
//!     resolver.rs clones the base config
//!     → remote.rs asks the configuration server for overrides
//!     → overrides merged into the clone
//!     → validation.rs (connection-scope checks)
//!     → AppConfig owned by that connection only
//! ```
//!
//! # Design Decisions
//! - The base config is never mutated after boot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod remote;
pub mod resolver;
pub mod schema;
pub mod validation;

pub use resolver::{ConfigResolver, ResolveError, CONNECTION_CONFIG_TIMEOUT};
pub use schema::{
    AppConfig, BackendSettings, ConfigServerConfig, LogConfig, LogFormat, LogLevel, PolicyMode,
    RequestPolicy, SecurityConfig,
};
pub use validation::{validate_config, ValidationError, ValidationErrors, ValidationScope};
