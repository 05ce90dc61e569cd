use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::KeyPoolRegistry;

/// How a caller waits out an exhausted pool: one immediate try, then up
/// to `retries` more, sleeping a geometrically growing pause before each.
/// The pool never sleeps on its own; this lives entirely on the caller side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub retries: u32,
    /// Pause before the first retry
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Growth per retry; 1.0 keeps a flat cadence
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Pause before retry `n`: `base_delay * factor^n`, never above `max_delay`.
    pub fn backoff(&self, n: u32) -> Duration {
        let exponent = i32::try_from(n).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(self.max_delay, |pause| pause.min(self.max_delay))
    }
}

/// Polls `registry` for a key from `pool`, sleeping between attempts.
/// Returns `None` once the retries are used up.
pub async fn acquire_with_backoff(
    registry: &KeyPoolRegistry,
    pool: &str,
    retry: &RetryConfig,
) -> Option<String> {
    if let Some(key) = registry.acquire(pool) {
        return Some(key);
    }

    for attempt in 0..retry.retries {
        let pause = retry.backoff(attempt);
        debug!(pool, attempt, ?pause, "No key available, backing off");
        tokio::time::sleep(pause).await;

        if let Some(key) = registry.acquire(pool) {
            return Some(key);
        }
    }

    None
}
