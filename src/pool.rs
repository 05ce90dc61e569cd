use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::errors::PoolError;
use crate::models::{fingerprint, KeyRecord, PoolSnapshot};
use crate::rate_limit::RateLimitPolicy;

const DEFAULT_POOL_NAME: &str = "unnamed";

// Rolling quota window, measured as elapsed time since the last reset
fn daily_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug)]
struct PoolState {
    /// Rotation ring. `front` is the next candidate; rotating advances it.
    records: Vec<KeyRecord>,
    front: usize,
    daily_count: u64,
    last_reset: DateTime<Utc>,
}

impl PoolState {
    fn rotate(&mut self) {
        if !self.records.is_empty() {
            self.front = (self.front + 1) % self.records.len();
        }
    }

    fn find_mut(&mut self, credential: &str) -> Option<&mut KeyRecord> {
        self.records.iter_mut().find(|r| r.credential == credential)
    }

    fn ring_order(&self) -> impl Iterator<Item = &KeyRecord> {
        let (tail, head) = self.records.split_at(self.front);
        head.iter().chain(tail.iter())
    }
}

/// A fixed set of credentials for one resource, dispensed round-robin under
/// a per-key minimum interval and a pool-wide daily quota.
#[derive(Debug)]
pub struct KeyPool {
    name: String,
    policy: RateLimitPolicy,
    state: Mutex<PoolState>,
}

impl KeyPool {
    /// Builds a pool from an ordered list of credentials.
    ///
    /// Entries are trimmed and whitespace-only entries dropped; an empty
    /// result is allowed and gives a pool that never dispenses. The policy
    /// and every remaining entry are validated before anything is built.
    pub fn new<I, S>(credentials: I, policy: RateLimitPolicy) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        policy.validate()?;
        let records = normalize_credentials(credentials)?
            .into_iter()
            .map(KeyRecord::new)
            .collect();

        Ok(Self {
            name: DEFAULT_POOL_NAME.to_string(),
            policy,
            state: Mutex::new(PoolState {
                records,
                front: 0,
                daily_count: 0,
                last_reset: Utc::now(),
            }),
        })
    }

    /// Parses a comma or newline separated list, then builds as [`KeyPool::new`].
    pub fn from_list(credentials: &str, policy: RateLimitPolicy) -> Result<Self, PoolError> {
        Self::new(split_credentials(credentials), policy)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.lock_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn daily_count(&self) -> u64 {
        self.lock_state().daily_count
    }

    /// Dispenses the first eligible key in ring order, or `None` when the
    /// daily quota is spent or every key is unavailable or too recently used.
    ///
    /// The clock is read after the pool lock is taken, so a caller that
    /// waited on the lock is stamped with the time it actually dispensed.
    pub fn acquire(&self) -> Option<String> {
        let mut state = self.lock_state();
        let now = Utc::now();
        self.acquire_locked(&mut state, now)
    }

    /// [`KeyPool::acquire`] with an explicit clock reading.
    pub fn acquire_at(&self, now: DateTime<Utc>) -> Option<String> {
        let mut state = self.lock_state();
        self.acquire_locked(&mut state, now)
    }

    // The whole check-and-mark sequence runs under the pool lock, so two
    // callers can never both pass the interval check for the same key.
    fn acquire_locked(&self, state: &mut PoolState, now: DateTime<Utc>) -> Option<String> {
        if now.signed_duration_since(state.last_reset) >= daily_window() {
            info!(
                pool = %self.name,
                dispensed = state.daily_count,
                "Daily window elapsed, resetting quota"
            );
            state.daily_count = 0;
            state.last_reset = now;
        }

        if let Some(limit) = self.policy.daily_limit {
            if state.daily_count >= u64::from(limit) {
                debug!(pool = %self.name, limit, "Daily limit reached");
                return None;
            }
        }

        let min_interval = self.policy.min_interval();
        for _ in 0..state.records.len() {
            let index = state.front;
            state.rotate();

            let record = &mut state.records[index];
            if record.is_eligible(now, min_interval) {
                record.mark_dispensed(now);
                let credential = record.credential.clone();
                state.daily_count += 1;
                debug!(
                    pool = %self.name,
                    key = %fingerprint(&credential),
                    daily_count = state.daily_count,
                    "Dispensed key"
                );
                return Some(credential);
            }
        }

        debug!(pool = %self.name, keys = state.records.len(), "No key available");
        None
    }

    pub fn report_outcome(&self, credential: &str, success: bool) {
        self.report_outcome_at(credential, success, Utc::now());
    }

    /// Records the result of a call made with a dispensed key. Failures bump
    /// the error counters; success changes nothing. Never disables a key.
    pub fn report_outcome_at(&self, credential: &str, success: bool, now: DateTime<Utc>) {
        if success {
            return;
        }

        let mut state = self.lock_state();
        match state.find_mut(credential) {
            Some(record) => {
                record.mark_failed(now);
                warn!(
                    pool = %self.name,
                    key = %fingerprint(credential),
                    error_count = record.error_count,
                    "Call failure reported"
                );
            }
            None => {
                debug!(pool = %self.name, "Outcome reported for unknown key, ignoring");
            }
        }
    }

    /// Includes or excludes a key from rotation. Returns whether it matched.
    /// Error counters are kept either way.
    pub fn set_available(&self, credential: &str, available: bool) -> bool {
        let mut state = self.lock_state();
        let Some(record) = state.find_mut(credential) else {
            return false;
        };

        if record.is_available != available {
            warn!(
                pool = %self.name,
                key = %fingerprint(credential),
                available,
                "Key availability changed"
            );
        }
        record.is_available = available;
        true
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock_state();
        PoolSnapshot {
            name: self.name.clone(),
            policy: self.policy.clone(),
            daily_count: state.daily_count,
            last_reset: state.last_reset,
            keys: state.ring_order().map(KeyRecord::snapshot).collect(),
        }
    }

    // Nothing inside the critical section can leave the state half-updated,
    // so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Splits a comma or newline separated credential list into trimmed,
/// non-empty entries.
pub fn parse_credentials(list: &str) -> Result<Vec<String>, PoolError> {
    normalize_credentials(split_credentials(list))
}

fn split_credentials(list: &str) -> impl Iterator<Item = &str> {
    list.split([',', '\n'])
}

fn normalize_credentials<I, S>(credentials: I) -> Result<Vec<String>, PoolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys = Vec::new();
    for (position, raw) in credentials.into_iter().enumerate() {
        let key = raw.as_ref().trim();
        if key.is_empty() {
            continue;
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(PoolError::MalformedCredential { position });
        }
        keys.push(key.to_string());
    }
    Ok(keys)
}
