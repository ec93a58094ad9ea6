//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Largest exponent applied; beyond this every delay is capped anyway.
const MAX_EXPONENT: u32 = 32;

/// Delay before reconnect `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = (attempt - 1).min(MAX_EXPONENT);
    let capped = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
