//! The routing table's single source of truth.
//!
//! # Responsibilities
//! - Hold the current [`Snapshot`] behind an atomically swappable pointer
//! - Apply session open/close as copy-on-write replacements
//! - Retire superseded snapshots by firing their change token
//!
//! # Design Decisions
//! - Readers never lock: `current()` is a single `ArcSwap` load
//! - Writers are serialized by a mutex so each snapshot is retired exactly once
//! - Invalid mutations are logged and dropped, never propagated

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use url::Url;

use crate::config::RoutingConfig;
use crate::observability::metrics;
use crate::routing::snapshot::{ClusterEntry, RouteEntry, RouteMatch, Snapshot, SnapshotError};

/// Id of the permanent route serving otherwise-unmatched traffic.
pub const CATCH_ALL_ROUTE_ID: &str = "catch-all";
/// Id of the cluster behind the catch-all route.
pub const CATCH_ALL_CLUSTER_ID: &str = "catch-all";

/// What a mutation did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A new snapshot was published.
    Published,
    /// The route id was already present; nothing changed.
    Duplicate,
    /// The resulting snapshot would be invalid; nothing changed.
    Rejected(SnapshotError),
    /// The route to close does not exist; nothing changed.
    NotFound,
    /// The catch-all route cannot be closed.
    Protected,
}

impl MutationOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, MutationOutcome::Published)
    }
}

/// Holds the current routing snapshot.
#[derive(Debug)]
pub struct ConfigurationStore {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl ConfigurationStore {
    /// Create a store whose first snapshot contains only the catch-all route.
    pub fn new(default_backend: Url, catch_all_path: &str) -> Self {
        let route = RouteEntry {
            id: CATCH_ALL_ROUTE_ID.to_string(),
            cluster_id: CATCH_ALL_CLUSTER_ID.to_string(),
            matcher: RouteMatch::path(catch_all_path),
            order: i32::MAX,
            metadata: Default::default(),
        };
        let cluster = ClusterEntry::single(CATCH_ALL_CLUSTER_ID, "default", default_backend);

        let initial = Snapshot::catch_all(route, cluster);
        metrics::record_snapshot(&initial);

        tracing::info!(
            route = CATCH_ALL_ROUTE_ID,
            "Configuration store initialized with catch-all route"
        );

        Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
        }
    }

    /// Create a store from validated routing configuration.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, url::ParseError> {
        let backend = Url::parse(&config.default_backend)?;
        Ok(Self::new(backend, &config.catch_all_path))
    }

    /// Latest published snapshot. Never blocks.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Add a session route, and its cluster if supplied.
    pub fn open_session(
        &self,
        route: RouteEntry,
        cluster: Option<ClusterEntry>,
    ) -> MutationOutcome {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current.load_full();

        if current.route(&route.id).is_some() {
            tracing::warn!(route = %route.id, "Route already exists, ignoring duplicate open");
            return MutationOutcome::Duplicate;
        }

        let mut clusters = current.clusters().to_vec();
        match cluster {
            Some(cluster) if current.cluster(&cluster.id) == Some(&cluster) => {}
            Some(cluster) => clusters.push(cluster),
            None => {}
        }
        let mut routes = current.routes().to_vec();
        let route_id = route.id.clone();
        let cluster_id = route.cluster_id.clone();
        routes.push(route);

        match Snapshot::new(routes, clusters) {
            Ok(next) => {
                self.publish(&current, next);
                tracing::info!(route = %route_id, cluster = %cluster_id, "Session route opened");
                MutationOutcome::Published
            }
            Err(e) => {
                tracing::error!(route = %route_id, error = %e, "Rejected session route");
                MutationOutcome::Rejected(e)
            }
        }
    }

    /// Remove a session route and any cluster no surviving route references.
    ///
    /// The cluster argument only names what the caller expects to be released;
    /// clusters are removed by reference count either way.
    pub fn close_session(
        &self,
        route: &RouteEntry,
        cluster: Option<&ClusterEntry>,
    ) -> MutationOutcome {
        if route.id == CATCH_ALL_ROUTE_ID {
            tracing::warn!(route = %route.id, "Refusing to close the catch-all route");
            return MutationOutcome::Protected;
        }

        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current.load_full();

        if current.route(&route.id).is_none() {
            tracing::warn!(route = %route.id, "Route not found, ignoring close");
            return MutationOutcome::NotFound;
        }

        let routes: Vec<RouteEntry> = current
            .routes()
            .iter()
            .filter(|r| r.id != route.id)
            .cloned()
            .collect();
        let referenced: HashSet<&str> = routes.iter().map(|r| r.cluster_id.as_str()).collect();
        let clusters: Vec<ClusterEntry> = current
            .clusters()
            .iter()
            .filter(|c| c.id == CATCH_ALL_CLUSTER_ID || referenced.contains(c.id.as_str()))
            .cloned()
            .collect();

        if let Some(expected) = cluster {
            if referenced.contains(expected.id.as_str()) {
                tracing::debug!(cluster = %expected.id, "Cluster still referenced, keeping it");
            }
        }

        match Snapshot::new(routes, clusters) {
            Ok(next) => {
                self.publish(&current, next);
                tracing::info!(route = %route.id, "Session route closed");
                MutationOutcome::Published
            }
            Err(e) => {
                tracing::error!(route = %route.id, error = %e, "Rejected session close");
                MutationOutcome::Rejected(e)
            }
        }
    }

    /// Swap in `next`, then retire `previous`. Caller holds the writer lock.
    fn publish(&self, previous: &Arc<Snapshot>, next: Snapshot) {
        metrics::record_snapshot(&next);
        self.current.store(Arc::new(next));
        previous.change_token().fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use std::collections::BTreeMap;

    const HEADER: &str = "x-content-token";

    fn store() -> ConfigurationStore {
        ConfigurationStore::new(Url::parse("http://10.0.0.1:8000").unwrap(), "/{**catch-all}")
    }

    fn session(token: &str, addr: &str) -> (RouteEntry, ClusterEntry) {
        let cluster_id = format!("cluster-{token}");
        let route = RouteEntry {
            id: format!("route-{token}"),
            cluster_id: cluster_id.clone(),
            matcher: RouteMatch::path("/{**catch-all}").with_header(HEADER, token),
            order: 0,
            metadata: BTreeMap::new(),
        };
        let cluster = ClusterEntry::single(cluster_id, "d", Url::parse(addr).unwrap());
        (route, cluster)
    }

    fn resolve(store: &ConfigurationStore, token: &'static str) -> String {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER, HeaderValue::from_static(token));
        let snapshot = store.current();
        let hit = snapshot.resolve("/page", &headers).unwrap();
        hit.destination.to_string()
    }

    #[test]
    fn test_catch_all_default() {
        let store = store();
        let snapshot = store.current();
        assert_eq!(snapshot.routes().len(), 1);
        assert_eq!(snapshot.routes()[0].id, CATCH_ALL_ROUTE_ID);

        let hit = snapshot.resolve("/anything", &HeaderMap::new()).unwrap();
        assert_eq!(hit.route.id, CATCH_ALL_ROUTE_ID);
        assert_eq!(hit.destination.as_str(), "http://10.0.0.1:8000/");
    }

    #[test]
    fn test_open_session_is_idempotent() {
        let store = store();
        let (route, cluster) = session("A", "http://10.0.0.5:8080");

        assert_eq!(
            store.open_session(route.clone(), Some(cluster.clone())),
            MutationOutcome::Published
        );
        let after_first = store.current();

        assert_eq!(store.open_session(route, Some(cluster)), MutationOutcome::Duplicate);
        let after_second = store.current();

        assert!(Arc::ptr_eq(&after_first, &after_second));
        assert_eq!(after_second.routes().iter().filter(|r| r.id == "route-A").count(), 1);
        assert!(!after_second.change_token().is_fired());
    }

    #[test]
    fn test_missing_cluster_is_rejected() {
        let store = store();
        let (route, _) = session("A", "http://10.0.0.5:8080");
        let before = store.current();

        let outcome = store.open_session(route, None);
        assert!(matches!(
            outcome,
            MutationOutcome::Rejected(SnapshotError::DanglingCluster { .. })
        ));
        assert!(Arc::ptr_eq(&before, &store.current()));
        assert!(!before.change_token().is_fired());
    }

    #[test]
    fn test_open_reuses_existing_cluster() {
        let store = store();
        let (route, cluster) = session("A", "http://10.0.0.5:8080");
        store.open_session(route, Some(cluster.clone()));

        let mut second = session("B", "http://10.0.0.5:8080").0;
        second.cluster_id = cluster.id.clone();
        assert!(store.open_session(second, None).is_published());

        // Same id, different address: not silently merged.
        let mut third = session("C", "http://10.0.0.7:8080").0;
        third.cluster_id = cluster.id.clone();
        let conflicting = ClusterEntry::single(
            cluster.id.clone(),
            "d",
            Url::parse("http://10.0.0.7:8080").unwrap(),
        );
        assert_eq!(
            store.open_session(third, Some(conflicting)),
            MutationOutcome::Rejected(SnapshotError::DuplicateCluster(cluster.id.clone()))
        );
    }

    #[test]
    fn test_session_scoping() {
        let store = store();
        let (ra, ca) = session("A", "http://10.0.0.5:8080");
        let (rb, cb) = session("B", "http://10.0.0.6:8080");
        store.open_session(ra, Some(ca));
        store.open_session(rb, Some(cb));

        assert_eq!(resolve(&store, "A"), "http://10.0.0.5:8080/");
        assert_eq!(resolve(&store, "B"), "http://10.0.0.6:8080/");
        assert_eq!(resolve(&store, "C"), "http://10.0.0.1:8000/");
    }

    #[test]
    fn test_publish_fires_previous_token() {
        let store = store();
        let first = store.current();
        let (route, cluster) = session("A", "http://10.0.0.5:8080");
        store.open_session(route, Some(cluster));

        assert!(first.change_token().is_fired());
        assert!(!store.current().change_token().is_fired());
    }

    #[test]
    fn test_close_removes_session_and_preserves_catch_all() {
        let store = store();
        let (route, cluster) = session("A", "http://10.0.0.5:8080");
        store.open_session(route.clone(), Some(cluster.clone()));

        assert_eq!(store.close_session(&route, Some(&cluster)), MutationOutcome::Published);

        let snapshot = store.current();
        assert!(snapshot.route("route-A").is_none());
        assert!(snapshot.cluster("cluster-A").is_none());
        assert!(snapshot.route(CATCH_ALL_ROUTE_ID).is_some());
        assert!(snapshot.cluster(CATCH_ALL_CLUSTER_ID).is_some());
        assert_eq!(resolve(&store, "A"), "http://10.0.0.1:8000/");
    }

    #[test]
    fn test_close_keeps_shared_cluster() {
        let store = store();
        let (ra, cluster) = session("A", "http://10.0.0.5:8080");
        let mut rb = session("B", "http://10.0.0.5:8080").0;
        rb.cluster_id = cluster.id.clone();
        store.open_session(ra.clone(), Some(cluster.clone()));
        store.open_session(rb, None);

        store.close_session(&ra, Some(&cluster));
        assert!(store.current().cluster(&cluster.id).is_some());
    }

    #[test]
    fn test_close_unknown_and_catch_all() {
        let store = store();
        let (route, _) = session("A", "http://10.0.0.5:8080");
        assert_eq!(store.close_session(&route, None), MutationOutcome::NotFound);

        let catch_all = store.current().route(CATCH_ALL_ROUTE_ID).cloned().unwrap();
        assert_eq!(store.close_session(&catch_all, None), MutationOutcome::Protected);
        assert_eq!(store.current().routes().len(), 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_dangling_routes() {
        let store = Arc::new(store());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let token = format!("t{i}");
                    let (route, cluster) = session(&token, "http://10.0.0.5:8080");
                    store.open_session(route.clone(), Some(cluster));
                    if i % 2 == 0 {
                        store.close_session(&route, None);
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.current();
                        for route in snapshot.routes() {
                            assert!(snapshot.cluster(&route.cluster_id).is_some());
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.current().routes().len(), 101);
    }
}
