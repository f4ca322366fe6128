//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` starts at 1. The delay doubles per attempt up to `max_ms`, then a
/// random jitter of up to `jitter_ms` is added.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Redial schedule for the websocket client.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    /// Jitter is bounded by the base delay, as the node-side dialers do.
    pub fn new(base_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_ms: base_ms,
            max_attempts,
        }
    }

    /// Delay before `attempt`, or `None` once the attempt ceiling is reached.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_attempts {
            return None;
        }
        Some(calculate_backoff(attempt, self.base_ms, self.max_ms, self.jitter_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
