use std::process::ExitCode;

use key_rotation_pool::{acquire_with_backoff, KeyPoolConfig, KeyPoolRegistry, RetryConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: keypool [status | acquire <pool> [--wait]]";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load pools from .env and the environment
    let registry = match KeyPoolConfig::from_env().and_then(|config| config.build_registry()) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Failed to load key pools: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["status"] => status(&registry),
        ["acquire", pool] => acquire(&registry, pool, false).await,
        ["acquire", pool, "--wait"] => acquire(&registry, pool, true).await,
        _ => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}

fn status(registry: &KeyPoolRegistry) -> ExitCode {
    match serde_json::to_string_pretty(&registry.snapshot()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to serialize pool status: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn acquire(registry: &KeyPoolRegistry, pool: &str, wait: bool) -> ExitCode {
    let key = if wait {
        acquire_with_backoff(registry, pool, &RetryConfig::default()).await
    } else {
        registry.acquire(pool)
    };

    match key {
        Some(key) => {
            println!("{key}");
            ExitCode::SUCCESS
        }
        None => {
            tracing::warn!("No key available from pool {}", pool);
            ExitCode::FAILURE
        }
    }
}
