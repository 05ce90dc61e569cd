use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::PoolError;

/// Request cadence and quota for one pool. Immutable once a pool holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_second: f64,
    /// Declared ceiling on rapid consecutive dispensations. Carried for
    /// configuration compatibility; selection does not consult it.
    pub burst_limit: Option<u32>,
    /// Ceiling on dispensations from the whole pool per rolling 24 hours.
    pub daily_limit: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_limit: None,
            daily_limit: None,
        }
    }
}

impl RateLimitPolicy {
    pub fn new(requests_per_second: f64) -> Result<Self, PoolError> {
        let policy = Self {
            requests_per_second,
            burst_limit: None,
            daily_limit: None,
        };
        policy.validate()?;
        Ok(policy)
    }

    // Search API preset: 10 requests per second, 1000 per day
    pub fn tavily() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_limit: None,
            daily_limit: Some(1000),
        }
    }

    pub fn with_burst_limit(mut self, burst_limit: u32) -> Self {
        self.burst_limit = Some(burst_limit);
        self
    }

    pub fn with_daily_limit(mut self, daily_limit: u32) -> Self {
        self.daily_limit = Some(daily_limit);
        self
    }

    /// Checks every field. Pools refuse to build from a policy that fails here.
    pub fn validate(&self) -> Result<(), PoolError> {
        let rps = self.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(PoolError::InvalidRate(rps));
        }
        if self.burst_limit == Some(0) {
            return Err(PoolError::InvalidLimit {
                field: "burst_limit",
            });
        }
        if self.daily_limit == Some(0) {
            return Err(PoolError::InvalidLimit {
                field: "daily_limit",
            });
        }
        Ok(())
    }

    /// Minimum spacing between two dispensations of the same key.
    pub fn min_interval(&self) -> Duration {
        // Public fields may have been changed after validate()
        Duration::try_from_secs_f64(1.0 / self.requests_per_second).unwrap_or(Duration::MAX)
    }
}
