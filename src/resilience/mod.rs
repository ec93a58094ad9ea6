//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Control channel connect fails or drops:
//!     → reconnect.rs (policy picks the delay for this attempt)
//!     → backoff.rs (exponential strategy only)
//!     → sleep, then connect again; no attempt limit
//! ```
//!
//! # Design Decisions
//! - The control plane retries forever; data plane keeps serving meanwhile
//! - Policies are plain strategy objects (`attempt -> delay`)
//! - Jittered backoff prevents thundering herd against the orchestrator

pub mod backoff;
pub mod reconnect;

pub use reconnect::{
    policy_from_config, ConstantDelay, ExponentialBackoff, ReconnectPolicy, RetryContext,
};
