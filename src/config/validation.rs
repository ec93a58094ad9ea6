//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that control channel and backend URLs are usable
//! - Check that the catch-all path really matches every request
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Plain `ws`/`http` only: the control channel and the forwarding client
//!   are built without TLS

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, ReconnectStrategy};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field}: unsupported scheme '{scheme}'")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: invalid header name '{value}'")]
    InvalidHeaderName { field: &'static str, value: String },

    #[error("{field}: '{value}' must be a bare catch-all pattern such as '/{{**catch-all}}'")]
    InvalidCatchAll { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("control_channel.reconnect: max_delay_secs ({max}) is below delay_secs ({base})")]
    DelayRange { base: u64, max: u64 },
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(
        &mut errors,
        "control_channel.url",
        &config.control_channel.url,
        &["ws"],
    );
    check_url(
        &mut errors,
        "routing.default_backend",
        &config.routing.default_backend,
        &["http"],
    );

    if !is_bare_catch_all(&config.routing.catch_all_path) {
        errors.push(ValidationError::InvalidCatchAll {
            field: "routing.catch_all_path",
            value: config.routing.catch_all_path.clone(),
        });
    }

    if HeaderName::from_bytes(config.routing.content_token_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName {
            field: "routing.content_token_header",
            value: config.routing.content_token_header.clone(),
        });
    }

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let reconnect = &config.control_channel.reconnect;
    let non_zero = [
        ("control_channel.reconnect.delay_secs", reconnect.delay_secs),
        (
            "control_channel.connect_timeout_secs",
            config.control_channel.connect_timeout_secs,
        ),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if reconnect.strategy == ReconnectStrategy::Exponential
        && reconnect.max_delay_secs < reconnect.delay_secs
    {
        errors.push(ValidationError::DelayRange {
            base: reconnect.delay_secs,
            max: reconnect.max_delay_secs,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `/{**name}` with a non-empty name: a prefix match on "/", i.e. every path.
fn is_bare_catch_all(pattern: &str) -> bool {
    pattern
        .strip_prefix("/{**")
        .and_then(|rest| rest.strip_suffix('}'))
        .is_some_and(|name| !name.is_empty() && !name.contains(['/', '{', '}']))
}

fn check_url(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
    schemes: &[&str],
) {
    match Url::parse(value) {
        Ok(url) if !schemes.contains(&url.scheme()) => {
            errors.push(ValidationError::UnsupportedScheme {
                field,
                scheme: url.scheme().to_string(),
            });
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidUrl {
                field,
                value: value.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
