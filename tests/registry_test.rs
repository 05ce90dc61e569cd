use key_rotation_pool::{
    acquire_with_backoff,
    rate_limit::RateLimitPolicy,
    registry::KeyPoolRegistry,
    PoolError, RetryConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn quota_policy(daily_limit: u32) -> RateLimitPolicy {
    RateLimitPolicy::new(1000.0).unwrap().with_daily_limit(daily_limit)
}

#[tokio::test]
async fn test_unknown_pool_is_exhausted() {
    let registry = KeyPoolRegistry::new();

    assert_eq!(registry.acquire("nope"), None);
    assert!(!registry.set_available("nope", "key", false));
    // Reporting against an unknown pool is a no-op
    registry.report_outcome("nope", "key", false);
    assert!(registry.snapshot().is_empty());
}

#[tokio::test]
async fn test_initialize_and_acquire() {
    let registry = KeyPoolRegistry::new();
    registry
        .initialize_pool_from_list("search", "k1,k2", RateLimitPolicy::default())
        .unwrap();

    assert_eq!(registry.acquire("search").as_deref(), Some("k1"));
    assert_eq!(registry.acquire("search").as_deref(), Some("k2"));
    assert_eq!(registry.pool_names(), vec!["search"]);
}

#[tokio::test]
async fn test_reinitialize_replaces_state() {
    let registry = KeyPoolRegistry::new();
    registry.initialize_pool("search", ["k1"], quota_policy(1)).unwrap();

    assert!(registry.acquire("search").is_some());
    assert_eq!(registry.acquire("search"), None);
    registry.report_outcome("search", "k1", false);

    // Fresh pool under the same name: no quota usage or counters carried over
    registry.initialize_pool("search", ["k1"], quota_policy(1)).unwrap();
    let pool = registry.pool("search").unwrap();
    assert_eq!(pool.daily_count(), 0);
    let snapshot = pool.snapshot();
    assert_eq!(snapshot.keys[0].request_count, 0);
    assert_eq!(snapshot.keys[0].error_count, 0);

    assert!(registry.acquire("search").is_some());
}

#[tokio::test]
async fn test_failed_initialize_keeps_previous_pool() {
    let registry = KeyPoolRegistry::new();
    registry
        .initialize_pool("search", ["k1"], RateLimitPolicy::default())
        .unwrap();

    let bad = RateLimitPolicy {
        requests_per_second: -1.0,
        ..RateLimitPolicy::default()
    };
    let result = registry.initialize_pool("search", ["k2"], bad);
    assert_eq!(result, Err(PoolError::InvalidRate(-1.0)));

    let result = registry.initialize_pool_from_list("search", "k2,k 3", RateLimitPolicy::default());
    assert!(matches!(result, Err(PoolError::MalformedCredential { .. })));

    assert_eq!(registry.acquire("search").as_deref(), Some("k1"));
}

#[tokio::test]
async fn test_pools_are_independent() {
    let registry = KeyPoolRegistry::new();
    registry.initialize_pool("a", ["a1"], quota_policy(1)).unwrap();
    registry.initialize_pool("b", ["b1"], quota_policy(1)).unwrap();

    assert_eq!(registry.acquire("a").as_deref(), Some("a1"));
    assert_eq!(registry.acquire("a"), None);
    // Exhausting a leaves b untouched
    assert_eq!(registry.acquire("b").as_deref(), Some("b1"));
}

#[tokio::test]
async fn test_health_hooks_forwarded() {
    let registry = KeyPoolRegistry::new();
    registry
        .initialize_pool("search", ["k1", "k2"], RateLimitPolicy::default())
        .unwrap();

    registry.report_outcome("search", "k1", false);
    assert!(registry.set_available("search", "k1", false));
    assert!(!registry.set_available("search", "missing", false));

    let snapshot = registry.pool("search").unwrap().snapshot();
    let total_errors: u64 = snapshot.keys.iter().map(|k| k.error_count).sum();
    assert_eq!(total_errors, 1);

    // k1 is skipped, k2 is dispensed once and then cools down for 100ms
    assert_eq!(registry.acquire("search").as_deref(), Some("k2"));
    assert_eq!(registry.acquire("search"), None);
    assert_eq!(registry.acquire("search"), None);
}

#[tokio::test]
async fn test_snapshot_sorted_by_name() {
    let registry = KeyPoolRegistry::new();
    for name in ["zeta", "alpha", "mid"] {
        registry
            .initialize_pool(name, ["k"], RateLimitPolicy::default())
            .unwrap();
    }

    let names: Vec<_> = registry.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_quota_across_tasks() {
    let registry = Arc::new(KeyPoolRegistry::new());
    registry
        .initialize_pool("search", ["k1", "k2", "k3"], quota_policy(50))
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::task::spawn_blocking(move || {
                let mut got = 0u64;
                for _ in 0..200 {
                    if registry.acquire("search").is_some() {
                        got += 1;
                    }
                }
                got
            })
        })
        .collect();

    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }

    // The daily quota is never overrun, whatever the interleaving
    assert!(total <= 50);
    assert_eq!(registry.pool("search").unwrap().daily_count(), total);
}

#[tokio::test]
async fn test_acquire_with_backoff_waits_for_cooldown() {
    let registry = KeyPoolRegistry::new();
    // One key, usable every 100ms
    registry
        .initialize_pool("search", ["k1"], RateLimitPolicy::new(10.0).unwrap())
        .unwrap();
    assert!(registry.acquire("search").is_some());

    let retry = RetryConfig::with_retries(10)
        .base_delay(Duration::from_millis(20))
        .max_delay(Duration::from_millis(50));
    let key = acquire_with_backoff(&registry, "search", &retry).await;
    assert_eq!(key.as_deref(), Some("k1"));
}

#[tokio::test]
async fn test_acquire_with_backoff_gives_up() {
    let registry = KeyPoolRegistry::new();
    let retry = RetryConfig::with_retries(2)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(2));

    assert_eq!(acquire_with_backoff(&registry, "missing", &retry).await, None);
}
