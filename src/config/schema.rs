//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the session proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Connection to the session orchestrator.
    pub control_channel: ControlChannelConfig,

    /// Permanent routing settings (catch-all backend, token header).
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Control channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlChannelConfig {
    /// WebSocket URL of the orchestrator hub (ws:// only).
    pub url: String,

    /// Handshake timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Delay policy between reconnect attempts.
    pub reconnect: ReconnectConfig,
}

impl Default for ControlChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/proxy-hub".to_string(),
            connect_timeout_secs: 10,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectStrategy {
    /// Same delay before every attempt.
    Constant,
    /// Doubling delay with jitter, capped at `max_delay_secs`.
    Exponential,
}

/// Reconnect configuration. There is no attempt limit: the channel retries forever.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub strategy: ReconnectStrategy,

    /// Constant delay, or base delay for the exponential strategy.
    pub delay_secs: u64,

    /// Upper bound for the exponential strategy.
    pub max_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::Constant,
            delay_secs: 15,
            max_delay_secs: 60,
        }
    }
}

/// Permanent routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Base address of the backend that receives unmatched traffic.
    pub default_backend: String,

    /// Request header carrying the content token of a session.
    pub content_token_header: String,

    /// Path pattern used by the catch-all route and by session routes.
    /// Must be a bare `/{**name}` pattern so the catch-all matches every path.
    pub catch_all_path: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_backend: "http://127.0.0.1:8000".to_string(),
            content_token_header: "X-Content-Token".to_string(),
            catch_all_path: "/{**catch-all}".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 100,
            shutdown_drain_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Full,
    Compact,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.routing.content_token_header, "X-Content-Token");
        assert_eq!(config.control_channel.reconnect.strategy, ReconnectStrategy::Constant);
        assert_eq!(config.control_channel.reconnect.delay_secs, 15);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [control_channel]
            url = "ws://orchestrator.internal/proxy-hub"

            [control_channel.reconnect]
            strategy = "exponential"
            delay_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.control_channel.url, "ws://orchestrator.internal/proxy-hub");
        assert_eq!(config.control_channel.reconnect.strategy, ReconnectStrategy::Exponential);
        assert_eq!(config.control_channel.reconnect.delay_secs, 2);
        assert_eq!(config.control_channel.reconnect.max_delay_secs, 60);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
