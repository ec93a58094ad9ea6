//! Response handling and transformation.
//!
//! # Responsibilities
//! - Rewrite redirect `Location` headers that point at the internal backend
//!   address so clients are sent back through the proxy
//!
//! # Design Decisions
//! - Only absolute redirects to the exact internal host (and port, when the
//!   Location names one) are touched; relative and third-party redirects pass
//! - Path, query and scheme are never changed

use axum::http::header::LOCATION;
use axum::http::response::Parts;
use axum::http::uri::Authority;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use url::Url;

use crate::observability::metrics;

/// Per-request facts a response transform may need.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Destination the request was forwarded to.
    pub target: &'a Url,
    /// `Host` header of the inbound request.
    pub inbound_host: Option<&'a str>,
}

/// A hook run by the forwarding engine on every proxied response.
pub trait ResponseTransform: Send + Sync {
    fn apply(&self, ctx: &TransformContext<'_>, response: &mut Parts);
}

/// Rewrites redirects that would leak the backend's internal address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseRewriteTransform;

impl ResponseTransform for ResponseRewriteTransform {
    fn apply(&self, ctx: &TransformContext<'_>, response: &mut Parts) {
        if rewrite_location(response.status, &mut response.headers, ctx.target, ctx.inbound_host) {
            metrics::record_location_rewrite();
            tracing::debug!(
                target_addr = %ctx.target,
                location = ?response.headers.get(LOCATION),
                "Rewrote redirect location"
            );
        }
    }
}

/// Rewrite `Location` in place. Returns true if the header was changed.
pub fn rewrite_location(
    status: StatusCode,
    headers: &mut HeaderMap,
    target: &Url,
    inbound_host: Option<&str>,
) -> bool {
    if !status.is_redirection() {
        return false;
    }
    let Some(mut location) = headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
    else {
        return false;
    };
    if !points_at(&location, target) {
        return false;
    }
    let Some(authority) = inbound_host.and_then(|h| h.parse::<Authority>().ok()) else {
        return false;
    };

    if location.set_host(Some(authority.host())).is_err()
        || location.set_port(authority.port_u16()).is_err()
    {
        return false;
    }
    match HeaderValue::from_str(location.as_str()) {
        Ok(value) => {
            headers.insert(LOCATION, value);
            true
        }
        Err(_) => false,
    }
}

/// Host equal to the target's, and port too when the location carries one.
fn points_at(location: &Url, target: &Url) -> bool {
    let same_host = match (location.host_str(), target.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    };
    same_host
        && location
            .port()
            .map_or(true, |port| Some(port) == target.port_or_known_default())
}
