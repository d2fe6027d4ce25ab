//! Basic usage example of the cache facade.

use cache_refresh::{
    backend::InMemoryBackend, error::Result, CacheClient, CacheConfig, CacheValue,
    RefreshCallback, SetOptions,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Cache Refresh - Basic Example ===\n");

    // 1. Initialize the client
    println!("1. Initializing in-memory cache backend...");
    let config = CacheConfig::default()
        .with_refresh_interval(Duration::from_millis(200))
        .with_refresh_min_ttl(Duration::from_millis(500));
    let cache = CacheClient::new(InMemoryBackend::new(), config);
    println!("   ✓ Cache ready\n");

    // 2. Plain set/get
    println!("2. set + get:");
    cache
        .set(
            "employment:emp_001",
            json!({"employer": "Acme Corp", "salary": 75000}),
            SetOptions::default().with_lifetime(Duration::from_secs(60)),
        )
        .await?;
    if let Some(emp) = cache.get("employment:emp_001").await? {
        println!("   ✓ Loaded from cache: {}\n", emp);
    }

    // 3. add refuses to overwrite
    println!("3. add on an existing key:");
    match cache.add("employment:emp_001", json!({}), None).await {
        Ok(()) => println!("   ✗ Unexpectedly overwritten\n"),
        Err(e) => println!("   ✓ Refused: {}\n", e),
    }

    // 4. Batches
    println!("4. mset + mget:");
    cache
        .mset(
            vec![
                ("rate:usd", CacheValue::Plain(json!(1.0))),
                (
                    "rate:eur",
                    CacheValue::WithLifetime(json!(0.92), Duration::from_secs(10)),
                ),
            ],
            Some(Duration::from_secs(30)),
        )
        .await?;
    let rates = cache.mget(&["rate:usd", "rate:eur", "rate:gbp"]).await?;
    for (key, value) in &rates {
        println!("   {} => {:?}", key, value);
    }
    println!();

    // 5. Background refresh
    println!("5. Background refresh:");
    let version = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&version);
    let refresh = RefreshCallback::new(move |key: String| {
        let version = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            println!("   [SOURCE] Recomputing {}", key);
            Ok(json!({"version": version}))
        }
    });
    cache
        .set(
            "report:daily",
            json!({"version": 0}),
            SetOptions::default()
                .with_lifetime(Duration::from_millis(400))
                .with_refresh(refresh),
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    if let Some(report) = cache.get("report:daily").await? {
        println!("   ✓ Still cached after its lifetime: {}\n", report);
    }

    // 6. Stop refreshing and delete
    println!("6. unsubscribe + del:");
    cache.unsubscribe("report:daily");
    cache.del(vec!["report:daily", "employment:emp_001"]).await?;
    println!(
        "   ✓ Gone: {}\n",
        cache.get("report:daily").await?.is_none()
    );

    // 7. Flush
    println!("7. flush:");
    cache.flush().await?;
    println!(
        "   ✓ Refresh enabled after flush: {}",
        cache.is_refresh_enabled()
    );

    println!("\n=== Example Complete ===\n");

    Ok(())
}
