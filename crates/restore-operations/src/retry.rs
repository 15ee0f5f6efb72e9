use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// Exponential backoff with full jitter for flaky external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps; used where retries must stay fast.
    #[must_use]
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Upper bound of the delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.delay_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
    }
}

/// Run `op` until it succeeds, `should_retry` rejects its error, or the
/// policy's attempts are used up. The last error is returned.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub fn retry_with_backoff<T, F, P>(
    policy: &RetryPolicy,
    what: &str,
    should_retry: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
    P: Fn(&crate::OperationError) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if attempt + 1 < attempts && should_retry(&error) => {
                let delay = policy.delay(attempt);
                warn!(
                    operation = what,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying after error: {error}"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Retry on anything except a missing target, which never heals by itself.
#[must_use]
pub fn transient(error: &crate::OperationError) -> bool {
    !error.is_target_not_found()
}
