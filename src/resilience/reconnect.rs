//! Reconnect delay policies for the control channel.
//!
//! A policy is asked once per failed attempt how long to wait before the
//! next one. Policies never say "stop": the channel retries forever.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ReconnectConfig, ReconnectStrategy};
use crate::resilience::backoff::calculate_backoff;

/// Facts about the reconnect loop handed to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Consecutive failed attempts, starting at 1.
    pub attempt: u32,
    /// Time since the channel was last connected (or first started).
    pub elapsed: Duration,
}

/// Supplies the delay before each reconnect attempt.
pub trait ReconnectPolicy: Send + Sync {
    fn next_delay(&self, ctx: &RetryContext) -> Duration;
}

impl<F> ReconnectPolicy for F
where
    F: Fn(&RetryContext) -> Duration + Send + Sync,
{
    fn next_delay(&self, ctx: &RetryContext) -> Duration {
        self(ctx)
    }
}

/// Same delay before every attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConstantDelay(pub Duration);

impl ReconnectPolicy for ConstantDelay {
    fn next_delay(&self, _ctx: &RetryContext) -> Duration {
        self.0
    }
}

/// Doubling delay with jitter, capped.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, ctx: &RetryContext) -> Duration {
        calculate_backoff(
            ctx.attempt.max(1),
            self.base.as_millis() as u64,
            self.max.as_millis() as u64,
        )
    }
}

/// Build the configured policy.
pub fn policy_from_config(config: &ReconnectConfig) -> Arc<dyn ReconnectPolicy> {
    let delay = Duration::from_secs(config.delay_secs);
    match config.strategy {
        ReconnectStrategy::Constant => Arc::new(ConstantDelay(delay)),
        ReconnectStrategy::Exponential => Arc::new(ExponentialBackoff {
            base: delay,
            max: Duration::from_secs(config.max_delay_secs),
        }),
    }
}
