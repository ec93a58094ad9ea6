//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Control channel event
//!     → store.rs (open/close session, copy-on-write)
//!     → snapshot.rs (validate, index, publish)
//!     → old snapshot's ChangeToken fires
//!
//! Incoming Request (path, headers)
//!     → store.current() (atomic load)
//!     → Snapshot::resolve (ordered scan, matcher.rs conditions)
//!     → Return: route + cluster + destination, or no match
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; every change publishes a new one
//! - No regex in hot path (prefix and exact matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by `order`, then insertion)

pub mod matcher;
pub mod snapshot;
pub mod store;

pub use snapshot::{
    ChangeToken, ClusterEntry, Destination, MatchKey, Resolution, RouteEntry, RouteMatch, Snapshot,
    SnapshotError,
};
pub use store::{ConfigurationStore, MutationOutcome, CATCH_ALL_CLUSTER_ID, CATCH_ALL_ROUTE_ID};
