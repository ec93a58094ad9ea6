//! Translation of session events into routing table mutations.
//!
//! # Responsibilities
//! - Derive the header match a session event implies
//! - Skip events whose match is already routed (redelivery)
//! - Synthesize route + cluster pairs and hand them to the store
//!
//! # Design Decisions
//! - One dispatch function over a closed set of event variants
//! - Duplicate detection by canonical match key, not by route id:
//!   route ids are generated fresh per event, so only the match criteria
//!   identify a session across redeliveries
//! - Handlers are synchronous; the store never suspends

use std::sync::Arc;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::RoutingConfig;
use crate::control::messages::{InboundMessage, SessionEvent};
use crate::observability::metrics;
use crate::routing::{
    ClusterEntry, ConfigurationStore, MutationOutcome, RouteEntry, RouteMatch, Snapshot,
    SnapshotError,
};

/// Order given to session routes; anything below the catch-all's `i32::MAX` wins over it.
pub const SESSION_ROUTE_ORDER: i32 = 0;

/// A single event could not be applied.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("event carries an empty content token")]
    EmptyContentToken,

    #[error("invalid internal URI '{uri}': {reason}")]
    InvalidInternalUri { uri: String, reason: String },

    #[error("session route rejected: {0}")]
    Rejected(#[from] SnapshotError),
}

/// What handling an event did.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// A route was added; carries the snapshot to report upstream.
    Provisioned(Arc<Snapshot>),
    /// A route was removed; carries the snapshot to report upstream.
    Closed(Arc<Snapshot>),
    /// The session was already routed (or already gone); nothing changed.
    Unchanged,
    /// Informational event; the table is not touched.
    Observed,
}

impl HandlerOutcome {
    /// Snapshot to send back over the channel, if the table changed.
    pub fn report(&self) -> Option<&Arc<Snapshot>> {
        match self {
            HandlerOutcome::Provisioned(s) | HandlerOutcome::Closed(s) => Some(s),
            HandlerOutcome::Unchanged | HandlerOutcome::Observed => None,
        }
    }
}

/// Applies control channel events to a [`ConfigurationStore`].
#[derive(Debug, Clone)]
pub struct SessionHandler {
    store: Arc<ConfigurationStore>,
    token_header: String,
    route_path: String,
}

impl SessionHandler {
    pub fn new(store: Arc<ConfigurationStore>, routing: &RoutingConfig) -> Self {
        Self {
            store,
            token_header: routing.content_token_header.clone(),
            route_path: routing.catch_all_path.clone(),
        }
    }

    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }

    /// Dispatch one decoded message.
    pub fn handle(&self, message: InboundMessage) -> Result<HandlerOutcome, HandlerError> {
        let kind = message.kind();
        let result = match message {
            InboundMessage::NewSessionAuthorized(evt) => self.on_new_session_authorized(&evt),
            InboundMessage::SessionActivity(evt) => Ok(self.on_session_activity(&evt)),
            InboundMessage::SessionClosed(evt) => self.on_session_closed(&evt),
        };

        let outcome = match &result {
            Ok(HandlerOutcome::Provisioned(_)) => "provisioned",
            Ok(HandlerOutcome::Closed(_)) => "closed",
            Ok(HandlerOutcome::Unchanged) => "unchanged",
            Ok(HandlerOutcome::Observed) => "observed",
            Err(_) => "failed",
        };
        metrics::record_session_event(kind, outcome);
        result
    }

    /// Match criteria routing requests that carry this event's content token.
    pub fn session_match(&self, evt: &SessionEvent) -> RouteMatch {
        RouteMatch::path(self.route_path.as_str())
            .with_header(self.token_header.as_str(), evt.content_token.as_str())
    }

    fn on_new_session_authorized(
        &self,
        evt: &SessionEvent,
    ) -> Result<HandlerOutcome, HandlerError> {
        if evt.content_token.is_empty() {
            return Err(HandlerError::EmptyContentToken);
        }
        let address = parse_internal_uri(&evt.internal_uri)?;
        let criteria = self.session_match(evt);

        if let Some(existing) = self.store.current().route_by_match(&criteria) {
            tracing::warn!(
                content_token = %evt.content_token,
                route = %existing.id,
                "Session already routed, skipping redelivered event"
            );
            return Ok(HandlerOutcome::Unchanged);
        }

        let route_id = format!("session-{}", Uuid::new_v4());
        let cluster_id = format!("cluster-{}", Uuid::new_v4());

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("content-token".to_string(), evt.content_token.clone());
        metadata.insert("public-uri".to_string(), evt.public_uri.clone());
        if let Some(host) = &evt.requesting_host {
            metadata.insert("requesting-host".to_string(), host.clone());
        }

        let route = RouteEntry {
            id: route_id,
            cluster_id: cluster_id.clone(),
            matcher: criteria,
            order: SESSION_ROUTE_ORDER,
            metadata,
        };
        let cluster = ClusterEntry::single(cluster_id, "instance", address);

        tracing::info!(
            content_token = %evt.content_token,
            internal_uri = %evt.internal_uri,
            requesting_host = evt.requesting_host.as_deref().unwrap_or("-"),
            "New session authorized"
        );

        match self.store.open_session(route, Some(cluster)) {
            MutationOutcome::Published => Ok(HandlerOutcome::Provisioned(self.store.current())),
            MutationOutcome::Rejected(e) => Err(HandlerError::Rejected(e)),
            MutationOutcome::Duplicate | MutationOutcome::NotFound | MutationOutcome::Protected => {
                Ok(HandlerOutcome::Unchanged)
            }
        }
    }

    fn on_session_activity(&self, evt: &SessionEvent) -> HandlerOutcome {
        tracing::info!(
            content_token = %evt.content_token,
            public_uri = %evt.public_uri,
            "Session activity"
        );
        HandlerOutcome::Observed
    }

    fn on_session_closed(&self, evt: &SessionEvent) -> Result<HandlerOutcome, HandlerError> {
        let snapshot = self.store.current();
        let Some(route) = snapshot.route_by_match(&self.session_match(evt)) else {
            tracing::warn!(content_token = %evt.content_token, "No route for closed session");
            return Ok(HandlerOutcome::Unchanged);
        };
        let cluster = snapshot.cluster(&route.cluster_id);

        match self.store.close_session(route, cluster) {
            MutationOutcome::Published => Ok(HandlerOutcome::Closed(self.store.current())),
            MutationOutcome::Rejected(e) => Err(HandlerError::Rejected(e)),
            MutationOutcome::Duplicate | MutationOutcome::NotFound | MutationOutcome::Protected => {
                Ok(HandlerOutcome::Unchanged)
            }
        }
    }
}

/// Backends are reached over plain HTTP; the forwarding client has no TLS.
fn parse_internal_uri(raw: &str) -> Result<Url, HandlerError> {
    let invalid = |reason: String| HandlerError::InvalidInternalUri {
        uri: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn handler() -> SessionHandler {
        let routing = RoutingConfig::default();
        let store = Arc::new(ConfigurationStore::from_config(&routing).unwrap());
        SessionHandler::new(store, &routing)
    }

    fn event(token: &str, internal: &str) -> SessionEvent {
        SessionEvent {
            content_token: token.to_string(),
            internal_uri: internal.to_string(),
            public_uri: "https://portal.example.com/report".to_string(),
            session_token: None,
            requesting_host: Some("portal.example.com".to_string()),
        }
    }

    fn destination_for(handler: &SessionHandler, token: &'static str) -> String {
        let mut headers = HeaderMap::new();
        headers.insert("x-content-token", HeaderValue::from_static(token));
        let snapshot = handler.store().current();
        let hit = snapshot.resolve("/report", &headers).unwrap();
        hit.destination.to_string()
    }

    #[test]
    fn test_new_session_provisions_route_and_cluster() {
        let handler = handler();
        let outcome = handler
            .handle(InboundMessage::NewSessionAuthorized(event("A", "http://10.0.0.5:8080")))
            .unwrap();

        let snapshot = outcome.report().unwrap();
        assert_eq!(snapshot.routes().len(), 2);
        assert_eq!(snapshot.clusters().len(), 2);

        let route = snapshot.routes().last().unwrap();
        assert_eq!(route.order, SESSION_ROUTE_ORDER);
        assert_eq!(route.metadata["content-token"], "A");
        assert_eq!(route.metadata["requesting-host"], "portal.example.com");
        assert_eq!(destination_for(&handler, "A"), "http://10.0.0.5:8080/");
    }

    #[test]
    fn test_redelivery_is_ignored() {
        let handler = handler();
        let msg = InboundMessage::NewSessionAuthorized(event("A", "http://10.0.0.5:8080"));

        assert!(matches!(handler.handle(msg.clone()).unwrap(), HandlerOutcome::Provisioned(_)));
        assert!(matches!(handler.handle(msg).unwrap(), HandlerOutcome::Unchanged));

        let snapshot = handler.store().current();
        assert_eq!(snapshot.routes().len(), 2);
        assert_eq!(snapshot.clusters().len(), 2);
    }

    #[test]
    fn test_activity_does_not_mutate() {
        let handler = handler();
        let before = handler.store().current();
        let outcome = handler
            .handle(InboundMessage::SessionActivity(event("A", "http://10.0.0.5:8080")))
            .unwrap();

        assert!(matches!(outcome, HandlerOutcome::Observed));
        assert!(outcome.report().is_none());
        assert!(Arc::ptr_eq(&before, &handler.store().current()));
    }

    #[test]
    fn test_invalid_events_fail_without_mutation() {
        let handler = handler();
        let before = handler.store().current();

        let err = handler
            .handle(InboundMessage::NewSessionAuthorized(event("A", "not a uri")))
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidInternalUri { .. }));

        let err = handler
            .handle(InboundMessage::NewSessionAuthorized(event("", "http://10.0.0.5")))
            .unwrap_err();
        assert!(matches!(err, HandlerError::EmptyContentToken));

        let err = handler
            .handle(InboundMessage::NewSessionAuthorized(event("A", "https://10.0.0.5:8443")))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'https'"));

        assert!(Arc::ptr_eq(&before, &handler.store().current()));
    }

    #[test]
    fn test_session_closed_falls_back_to_catch_all() {
        let handler = handler();
        handler
            .handle(InboundMessage::NewSessionAuthorized(event("A", "http://10.0.0.5:8080")))
            .unwrap();

        let outcome = handler
            .handle(InboundMessage::SessionClosed(event("A", "http://10.0.0.5:8080")))
            .unwrap();
        assert_eq!(outcome.report().unwrap().routes().len(), 1);
        assert_eq!(destination_for(&handler, "A"), "http://127.0.0.1:8000/");

        let again = handler
            .handle(InboundMessage::SessionClosed(event("A", "http://10.0.0.5:8080")))
            .unwrap();
        assert!(matches!(again, HandlerOutcome::Unchanged));
    }
}
