use anyhow::{ensure, Result};
use lapse_core::{Cache, CacheConfig, ItemOptions, Ttl};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A value that owns something which must be released when it leaves the cache
#[derive(Debug)]
struct Session {
    user: String,
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lapse_demo=info,lapse_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration from environment variables, short demo-friendly fallbacks
    let mut config = CacheConfig::from_env();
    if std::env::var(lapse_core::CLEANUP_INTERVAL_ENV).is_err() {
        config = config.with_cleanup_interval(Duration::from_millis(200));
    }

    tracing::info!("🧪 Lapse cache demo");
    tracing::info!("   Default TTL: {:?}", config.default_ttl);
    tracing::info!("   Cleanup interval: {:?}", config.cleanup_interval);

    run_basic_operations(config.clone())?;
    run_parallel_set_get(config.clone()).await?;
    run_expiration(config.clone()).await?;
    run_hook_isolation(config).await?;

    tracing::info!("✅ All demo scenarios passed!");

    Ok(())
}

/// SET/GET/DELETE on a single key
fn run_basic_operations(config: CacheConfig) -> Result<()> {
    tracing::info!("Scenario: Basic Operations");

    let cache: Cache<String> = Cache::with_config(config);
    cache.set("a", "aaa".to_string(), Duration::from_secs(3600));

    ensure!(
        cache.get("a").as_deref().map(String::as_str) == Some("aaa"),
        "value should round-trip"
    );
    cache.delete("a")?;
    ensure!(cache.get("a").is_none(), "key should be gone after delete");
    ensure!(
        cache.delete("a").is_err_and(|err| err.is_not_found()),
        "second delete should report NotFound"
    );

    tracing::info!("   ✓ Basic operations work correctly");
    Ok(())
}

/// Parallel writers and readers on disjoint keys - verify no data mixing
async fn run_parallel_set_get(config: CacheConfig) -> Result<()> {
    let num_tasks = 50;
    let ops_per_task = 200;
    tracing::info!(
        "Scenario: Parallel SET/GET ({} tasks x {} keys)",
        num_tasks,
        ops_per_task
    );

    let cache: Cache<String> = Cache::with_config(config);
    let errors = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for task_id in 0..num_tasks {
        let cache = cache.clone();
        let errors = Arc::clone(&errors);
        tasks.spawn(async move {
            for i in 0..ops_per_task {
                let key = format!("task{}:key{}", task_id, i);
                let value = format!("value-{}-{}", task_id, i);
                cache.set(key.clone(), value.clone(), Duration::from_secs(300));

                match cache.get(&key) {
                    Some(found) if *found == value => {}
                    other => {
                        tracing::error!("Mismatch for key {}: got {:?}", key, other);
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined?;
    }

    let elapsed = start.elapsed();
    let total = num_tasks * ops_per_task;
    tracing::info!(
        "   {} SET+GET pairs in {:?} ({:.0} ops/sec)",
        total,
        elapsed,
        (total * 2) as f64 / elapsed.as_secs_f64()
    );

    ensure!(errors.load(Ordering::SeqCst) == 0, "no reads should mismatch");
    ensure!(cache.len() == total, "every key should be stored");

    tracing::info!("   ✓ All {} values verified correctly", total);
    Ok(())
}

/// Expired entries read as absent at once and are swept without any read
async fn run_expiration(config: CacheConfig) -> Result<()> {
    tracing::info!("Scenario: Expiration and sweeping");

    let interval = config.cleanup_interval;
    let cache: Cache<u64> = Cache::with_config(config);
    let released = Arc::new(AtomicUsize::new(0));

    for i in 0..100 {
        let released = Arc::clone(&released);
        let options = ItemOptions::new().on_delete(move |_: &u64| {
            released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        cache.set_with_options(format!("short{}", i), i, Duration::from_millis(50), options);
    }
    cache.set("pinned", 0, Ttl::Never);

    tokio::time::sleep(Duration::from_millis(100)).await;
    ensure!(cache.get("short0").is_none(), "expired entry should read as absent");

    if interval.is_zero() {
        let removed = cache.cleanup();
        tracing::info!("   Sweeper disabled, manual cleanup removed {}", removed);
    } else {
        tokio::time::sleep(interval * 2).await;
    }

    ensure!(cache.keys() == vec!["pinned".to_string()], "only the pinned key should remain");
    ensure!(released.load(Ordering::SeqCst) == 100, "each hook should fire exactly once");

    tracing::info!("   ✓ 100 entries expired, swept and released");
    Ok(())
}

/// Failing and panicking hooks are contained
async fn run_hook_isolation(config: CacheConfig) -> Result<()> {
    tracing::info!("Scenario: Hook failure isolation");

    let cache: Cache<Session> = Cache::with_config(config);
    let closed = Arc::new(AtomicUsize::new(0));

    let session = |user: &str| Session {
        user: user.to_string(),
        token: format!("tok-{}", user),
    };

    let closed_hook = Arc::clone(&closed);
    cache.set_with_options(
        "alice",
        session("alice"),
        Ttl::Never,
        ItemOptions::new().on_delete(move |s: &Session| {
            tracing::info!("   closing session for {} ({})", s.user, s.token);
            closed_hook.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    cache.set_with_options(
        "bob",
        session("bob"),
        Ttl::Never,
        ItemOptions::new().on_delete(|s: &Session| anyhow::bail!("revoke failed for {}", s.user)),
    );
    cache.set_with_options(
        "carol",
        session("carol"),
        Ttl::Never,
        ItemOptions::new().on_delete(|_: &Session| panic!("session backend unreachable")),
    );

    let removed = cache.clear_all();
    ensure!(removed == 3, "clear_all should remove every session");
    ensure!(closed.load(Ordering::SeqCst) == 1, "healthy hook should still run");
    ensure!(cache.is_empty(), "cache should be empty");

    cache.shutdown();
    tracing::info!("   ✓ Hook failures were logged and contained");
    Ok(())
}
