use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

use crate::errors::PoolError;
use crate::pool::parse_credentials;
use crate::rate_limit::RateLimitPolicy;
use crate::registry::KeyPoolRegistry;

const KEYS_SUFFIX: &str = "_API_KEYS";

/// One pool as described by the environment.
#[derive(Clone, PartialEq)]
pub struct PoolConfig {
    pub name: String,
    pub credentials: Vec<String>,
    pub policy: RateLimitPolicy,
}

// Credentials are secrets, only their count is printed
impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("name", &self.name)
            .field("credentials", &self.credentials.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Pools discovered from `<PREFIX>_API_KEYS` variables.
///
/// `TAVILY_API_KEYS=k1,k2` defines pool `tavily`. Optional per-pool
/// overrides are `<PREFIX>_REQUESTS_PER_SECOND`, `<PREFIX>_DAILY_LIMIT` and
/// `<PREFIX>_BURST_LIMIT`; anything unset comes from the preset for that
/// pool name, or [`RateLimitPolicy::default`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPoolConfig {
    pub pools: Vec<PoolConfig>,
}

impl KeyPoolConfig {
    /// Reads `.env` if present, then the process environment. Variables
    /// that are not valid UTF-8 are skipped.
    pub fn from_env() -> Result<Self, PoolError> {
        dotenv::dotenv().ok();
        Self::from_vars(utf8_vars(std::env::vars_os()))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut pools = Vec::new();
        for (key, value) in &vars {
            let Some(prefix) = key.strip_suffix(KEYS_SUFFIX) else {
                continue;
            };
            if prefix.is_empty() {
                return Err(PoolError::Configuration(format!(
                    "{key} has no pool name prefix"
                )));
            }

            let name = prefix.to_lowercase();
            if pools.iter().any(|p: &PoolConfig| p.name == name) {
                return Err(PoolError::Configuration(format!(
                    "more than one *{KEYS_SUFFIX} variable maps to pool {name}"
                )));
            }
            let policy = policy_for(prefix, &name, &vars)?;
            let credentials = parse_credentials(value)?;
            pools.push(PoolConfig {
                name,
                credentials,
                policy,
            });
        }
        pools.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self { pools })
    }

    pub fn build_registry(&self) -> Result<KeyPoolRegistry, PoolError> {
        let registry = KeyPoolRegistry::new();
        for pool in &self.pools {
            registry.initialize_pool(&pool.name, &pool.credentials, pool.policy.clone())?;
        }
        Ok(registry)
    }
}

fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

fn preset(name: &str) -> RateLimitPolicy {
    match name {
        "tavily" => RateLimitPolicy::tavily(),
        _ => RateLimitPolicy::default(),
    }
}

fn policy_for(
    prefix: &str,
    name: &str,
    vars: &HashMap<String, String>,
) -> Result<RateLimitPolicy, PoolError> {
    let mut policy = preset(name);

    if let Some(rps) = setting::<f64>(vars, &format!("{prefix}_REQUESTS_PER_SECOND"))? {
        policy.requests_per_second = rps;
    }
    if let Some(limit) = setting::<u32>(vars, &format!("{prefix}_DAILY_LIMIT"))? {
        policy.daily_limit = Some(limit);
    }
    if let Some(limit) = setting::<u32>(vars, &format!("{prefix}_BURST_LIMIT"))? {
        policy.burst_limit = Some(limit);
    }

    policy.validate()?;
    Ok(policy)
}

fn setting<T: FromStr>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>, PoolError> {
    let Some(raw) = vars.get(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| PoolError::InvalidSetting {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
