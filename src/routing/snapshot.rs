//! Immutable routing table values.
//!
//! A [`Snapshot`] is built once, validated on construction, and never
//! mutated afterwards. The store publishes a new one for every change and
//! fires the predecessor's [`ChangeToken`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use axum::http::HeaderMap;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::routing::matcher::{HeaderMatch, Matcher, PathPattern};

/// Errors that make a set of routes and clusters unpublishable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("duplicate route id '{0}'")]
    DuplicateRoute(String),

    #[error("duplicate cluster id '{0}'")]
    DuplicateCluster(String),

    #[error("route '{route}' references missing cluster '{cluster}'")]
    DanglingCluster { route: String, cluster: String },
}

/// Match criteria of a route: optional path pattern AND every header constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathPattern>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatch>,
}

impl RouteMatch {
    pub fn path(pattern: impl Into<String>) -> Self {
        Self {
            path: Some(PathPattern::new(pattern)),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderMatch::new(name, value));
        self
    }

    /// Canonical key: two criteria with the same key match the same requests.
    pub fn key(&self) -> MatchKey {
        let mut pairs: Vec<(String, &str)> = self
            .headers
            .iter()
            .map(|h| (h.name.to_ascii_lowercase(), h.value.as_str()))
            .collect();
        pairs.sort();
        pairs.dedup();

        let mut key = String::from("path=");
        if let Some(path) = &self.path {
            key.push_str(&path.as_str().to_ascii_lowercase());
        }
        for (name, value) in pairs {
            key.push('&');
            key.push_str(&name);
            key.push('=');
            key.push_str(value);
        }
        MatchKey(key)
    }
}

impl Matcher for RouteMatch {
    fn matches(&self, path: &str, headers: &HeaderMap) -> bool {
        self.path.as_ref().map_or(true, |p| p.matches(path, headers))
            && self.headers.iter().all(|h| h.matches(path, headers))
    }
}

/// Canonical form of a [`RouteMatch`], used for O(1) duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey(String);

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A match rule pointing at one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub id: String,
    pub cluster_id: String,
    #[serde(rename = "match")]
    pub matcher: RouteMatch,
    /// Lower value wins when several routes match.
    pub order: i32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A single backend address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub address: Url,
}

/// A named set of backend destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub id: String,
    pub destinations: BTreeMap<String, Destination>,
}

impl ClusterEntry {
    /// Cluster with exactly one destination.
    pub fn single(id: impl Into<String>, destination_id: impl Into<String>, address: Url) -> Self {
        let mut destinations = BTreeMap::new();
        destinations.insert(destination_id.into(), Destination { address });
        Self {
            id: id.into(),
            destinations,
        }
    }

    /// The destination requests are sent to. Balancing across several is not done here.
    pub fn primary(&self) -> Option<&Url> {
        self.destinations.values().next().map(|d| &d.address)
    }
}

/// One-shot signal fired when the owning snapshot is superseded.
#[derive(Clone, Default)]
pub struct ChangeToken {
    inner: CancellationToken,
}

impl ChangeToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fire(&self) {
        self.inner.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Completes once the snapshot has been replaced.
    pub async fn changed(&self) {
        self.inner.cancelled().await
    }
}

impl fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeToken")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Result of resolving a request against a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub route: &'a RouteEntry,
    pub cluster: &'a ClusterEntry,
    pub destination: &'a Url,
}

/// Immutable, point-in-time routing table.
#[derive(Debug)]
pub struct Snapshot {
    routes: Vec<RouteEntry>,
    clusters: Vec<ClusterEntry>,
    route_index: HashMap<String, usize>,
    cluster_index: HashMap<String, usize>,
    match_index: HashMap<MatchKey, usize>,
    /// Route indices sorted by (order, insertion position).
    dispatch_order: Vec<usize>,
    change_token: ChangeToken,
}

impl Snapshot {
    /// Build a snapshot, rejecting duplicate ids and dangling cluster references.
    pub fn new(
        routes: Vec<RouteEntry>,
        clusters: Vec<ClusterEntry>,
    ) -> Result<Self, SnapshotError> {
        let mut cluster_index = HashMap::with_capacity(clusters.len());
        for (i, cluster) in clusters.iter().enumerate() {
            if cluster_index.insert(cluster.id.clone(), i).is_some() {
                return Err(SnapshotError::DuplicateCluster(cluster.id.clone()));
            }
        }

        let mut route_index = HashMap::with_capacity(routes.len());
        let mut match_index = HashMap::with_capacity(routes.len());
        for (i, route) in routes.iter().enumerate() {
            if route_index.insert(route.id.clone(), i).is_some() {
                return Err(SnapshotError::DuplicateRoute(route.id.clone()));
            }
            if !cluster_index.contains_key(&route.cluster_id) {
                return Err(SnapshotError::DanglingCluster {
                    route: route.id.clone(),
                    cluster: route.cluster_id.clone(),
                });
            }
            match_index.entry(route.matcher.key()).or_insert(i);
        }

        let mut dispatch_order: Vec<usize> = (0..routes.len()).collect();
        dispatch_order.sort_by_key(|&i| (routes[i].order, i));

        Ok(Self {
            routes,
            clusters,
            route_index,
            cluster_index,
            match_index,
            dispatch_order,
            change_token: ChangeToken::new(),
        })
    }

    /// Snapshot holding one route bound to one cluster. The route is pointed
    /// at the cluster here, so it cannot dangle.
    pub(crate) fn catch_all(mut route: RouteEntry, cluster: ClusterEntry) -> Self {
        route.cluster_id = cluster.id.clone();
        Self {
            route_index: HashMap::from([(route.id.clone(), 0)]),
            cluster_index: HashMap::from([(cluster.id.clone(), 0)]),
            match_index: HashMap::from([(route.matcher.key(), 0)]),
            dispatch_order: vec![0],
            routes: vec![route],
            clusters: vec![cluster],
            change_token: ChangeToken::new(),
        }
    }

    /// Routes in insertion order.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn clusters(&self) -> &[ClusterEntry] {
        &self.clusters
    }

    pub fn route(&self, id: &str) -> Option<&RouteEntry> {
        self.route_index.get(id).map(|&i| &self.routes[i])
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterEntry> {
        self.cluster_index.get(id).map(|&i| &self.clusters[i])
    }

    /// Route whose match criteria are equivalent to `criteria`.
    pub fn route_by_match(&self, criteria: &RouteMatch) -> Option<&RouteEntry> {
        self.match_index
            .get(&criteria.key())
            .map(|&i| &self.routes[i])
    }

    pub fn change_token(&self) -> &ChangeToken {
        &self.change_token
    }

    /// Find the winning route for a request and the address it forwards to.
    pub fn resolve(&self, path: &str, headers: &HeaderMap) -> Option<Resolution<'_>> {
        self.dispatch_order
            .iter()
            .map(|&i| &self.routes[i])
            .find(|route| route.matcher.matches(path, headers))
            .and_then(|route| {
                let cluster = self.cluster(&route.cluster_id)?;
                let destination = cluster.primary()?;
                Some(Resolution {
                    route,
                    cluster,
                    destination,
                })
            })
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Snapshot", 2)?;
        state.serialize_field("routes", &self.routes)?;
        state.serialize_field("clusters", &self.clusters)?;
        state.end()
    }
}
