use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::rate_limit::RateLimitPolicy;

/// Usage and health state of one credential. Owned by its pool and only
/// mutated under the pool's lock.
#[derive(Clone)]
pub struct KeyRecord {
    pub credential: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub is_available: bool,
    pub error_count: u64,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn new(credential: String) -> Self {
        Self {
            credential,
            last_used_at: None,
            request_count: 0,
            is_available: true,
            error_count: 0,
            last_error_at: None,
        }
    }

    /// Whether the key may be dispensed at `now` given the minimum spacing.
    pub fn is_eligible(&self, now: DateTime<Utc>, min_interval: std::time::Duration) -> bool {
        if !self.is_available {
            return false;
        }
        match self.last_used_at {
            None => true,
            // A negative elapsed time (clock stepped backwards) never qualifies
            Some(last) => match now.signed_duration_since(last).to_std() {
                Ok(elapsed) => elapsed >= min_interval,
                Err(_) => false,
            },
        }
    }

    pub fn mark_dispensed(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(match self.last_used_at {
            Some(last) if last > now => last,
            _ => now,
        });
        self.request_count += 1;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.error_count += 1;
        self.last_error_at = Some(now);
    }

    pub fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            fingerprint: fingerprint(&self.credential),
            last_used_at: self.last_used_at,
            request_count: self.request_count,
            is_available: self.is_available,
            error_count: self.error_count,
            last_error_at: self.last_error_at,
        }
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("credential", &fingerprint(&self.credential))
            .field("last_used_at", &self.last_used_at)
            .field("request_count", &self.request_count)
            .field("is_available", &self.is_available)
            .field("error_count", &self.error_count)
            .field("last_error_at", &self.last_error_at)
            .finish()
    }
}

// Short SHA-256 prefix so logs and snapshots can tell keys apart without
// exposing them
pub fn fingerprint(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct KeySnapshot {
    pub fingerprint: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub is_available: bool,
    pub error_count: u64,
    pub last_error_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub name: String,
    pub policy: RateLimitPolicy,
    pub daily_count: u64,
    pub last_reset: DateTime<Utc>,
    /// Keys in current rotation order, next candidate first.
    pub keys: Vec<KeySnapshot>,
}
