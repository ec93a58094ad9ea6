//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to startup, read once
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the routing table is the only thing
//!   that changes at runtime, and it lives in `routing::store`
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ControlChannelConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    ReconnectConfig, ReconnectStrategy, RoutingConfig, TimeoutConfig,
};
