// Rate-limited API key rotation
// Main library module

pub mod config;
pub mod errors;
pub mod models;
pub mod pool;
pub mod rate_limit;
pub mod registry;
pub mod retry;

// Re-export commonly used items
pub use config::{KeyPoolConfig, PoolConfig};
pub use errors::PoolError;
pub use models::{KeyRecord, KeySnapshot, PoolSnapshot};
pub use pool::{parse_credentials, KeyPool};
pub use rate_limit::RateLimitPolicy;
pub use registry::KeyPoolRegistry;
pub use retry::{acquire_with_backoff, RetryConfig};
