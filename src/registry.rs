use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::errors::PoolError;
use crate::models::PoolSnapshot;
use crate::pool::KeyPool;
use crate::rate_limit::RateLimitPolicy;

/// Directory of named key pools.
///
/// Owned by whoever wires up the outbound clients and passed to them; there
/// is no process-global instance. Lookups hold the registry lock only long
/// enough to clone the pool handle, so pools never contend with each other.
#[derive(Debug, Default)]
pub struct KeyPoolRegistry {
    pools: RwLock<HashMap<String, Arc<KeyPool>>>,
}

impl KeyPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pool and installs it under `name`, replacing any previous
    /// pool and its counters. On error the existing entry is left as is.
    pub fn initialize_pool<I, S>(
        &self,
        name: &str,
        credentials: I,
        policy: RateLimitPolicy,
    ) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pool = KeyPool::new(credentials, policy)?.with_name(name);
        self.install(name, pool);
        Ok(())
    }

    /// Same as [`KeyPoolRegistry::initialize_pool`] for a comma separated list.
    pub fn initialize_pool_from_list(
        &self,
        name: &str,
        credentials: &str,
        policy: RateLimitPolicy,
    ) -> Result<(), PoolError> {
        let pool = KeyPool::from_list(credentials, policy)?.with_name(name);
        self.install(name, pool);
        Ok(())
    }

    fn install(&self, name: &str, pool: KeyPool) {
        info!(
            pool = name,
            keys = pool.len(),
            requests_per_second = pool.policy().requests_per_second,
            daily_limit = ?pool.policy().daily_limit,
            "Initialized key pool"
        );
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        pools.insert(name.to_string(), Arc::new(pool));
    }

    pub fn pool(&self, name: &str) -> Option<Arc<KeyPool>> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        pools.get(name).cloned()
    }

    pub fn pool_names(&self) -> Vec<String> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = pools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Next key from the named pool. Unknown names behave like an exhausted pool.
    pub fn acquire(&self, name: &str) -> Option<String> {
        self.pool(name)?.acquire()
    }

    pub fn report_outcome(&self, name: &str, credential: &str, success: bool) {
        if let Some(pool) = self.pool(name) {
            pool.report_outcome(credential, success);
        }
    }

    pub fn set_available(&self, name: &str, credential: &str, available: bool) -> bool {
        self.pool(name)
            .is_some_and(|pool| pool.set_available(credential, available))
    }

    /// Snapshots of every pool, sorted by name.
    pub fn snapshot(&self) -> Vec<PoolSnapshot> {
        self.pool_names()
            .iter()
            .filter_map(|name| self.pool(name))
            .map(|pool| pool.snapshot())
            .collect()
    }
}
