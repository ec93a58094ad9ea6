//! Session-aware reverse proxy library.
//!
//! The routing table is driven at runtime by an orchestrator over a
//! WebSocket control channel; requests carrying a session's content token
//! are forwarded to that session's backend, everything else goes to the
//! default backend.

pub mod config;
pub mod control;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use control::{ChannelState, ControlChannelClient, SessionHandler};
pub use http::HttpServer;
pub use lifecycle::{RunningProxy, Shutdown};
pub use routing::{ConfigurationStore, Snapshot};
