//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request-id, timeout)
//!     → routing snapshot (resolve route + destination)
//!     → request.rs (upstream URI, forwarded headers)
//!     → hyper client → backend
//!     → response.rs (rewrite internal redirects)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{rewrite_location, ResponseRewriteTransform, ResponseTransform, TransformContext};
pub use server::HttpServer;
