//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (route, cluster, attempt) rather than formatted strings
//! - Request ID flows from the listener to the backend
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
