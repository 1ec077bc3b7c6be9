// tests/cache_contract.rs
//
// Every backend must honour the same observable contract. The in-memory one
// always runs (on paused time); Redis and Postgres run only when
// FEEDHUB_TEST_REDIS_URL / FEEDHUB_TEST_DATABASE_URL point at a live server.

use std::time::Duration;

use serde_json::json;

use feedhub::cache::{get_json, set_json, CacheProvider, MemoryCache, PostgresCache, RedisCache};
use feedhub::{CanonicalItem, FeedSnapshot, SnapshotOrigin};

fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}:{}:{nanos}", std::process::id())
}

async fn contract(cache: &dyn CacheProvider) {
    let key = unique("contract");

    // miss
    assert_eq!(cache.get(&key).await.unwrap(), None);

    // set → get
    let v = json!({ "items": [1, 2, 3], "ok": true });
    cache.set(&key, v.clone(), 60).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some(v));

    // overwrite is last-writer-wins
    cache.set(&key, json!("second"), 60).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some(json!("second")));

    // delete
    cache.delete(&key).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), None);
    cache.delete(&key).await.unwrap();

    // ttl 0 removes the key
    cache.set(&key, json!(1), 60).await.unwrap();
    cache.set(&key, json!(2), 0).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), None);

    // expiry
    cache.set(&key, json!("short"), 1).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some(json!("short")));
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(cache.get(&key).await.unwrap(), None);

    // snapshots survive the JSON trip unchanged
    let snap = FeedSnapshot {
        items: vec![CanonicalItem::new(
            "Poll shows tight race",
            "https://e.example/poll",
            chrono::Utc::now(),
            "Wire",
        )
        .with_summary("Within the margin of error.")],
        fetched_at: chrono::Utc::now(),
        source: SnapshotOrigin::Live,
    };
    set_json(cache, &key, &snap, 60).await.unwrap();
    let back: FeedSnapshot = get_json(cache, &key).await.unwrap().unwrap();
    assert_eq!(back.items, snap.items);
    assert_eq!(back.fetched_at, snap.fetched_at);

    cache.delete(&key).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn memory_backend_honours_contract() {
    let cache = MemoryCache::new();
    contract(&cache).await;
}

#[tokio::test(start_paused = true)]
async fn memory_purge_drops_only_expired_entries() {
    let cache = MemoryCache::new();
    cache.set("short", json!(1), 1).await.unwrap();
    cache.set("long", json!(2), 600).await.unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(cache.purge_expired().await.unwrap(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("long").await.unwrap(), Some(json!(2)));
}

#[tokio::test]
async fn redis_backend_honours_contract() {
    let Ok(url) = std::env::var("FEEDHUB_TEST_REDIS_URL") else {
        eprintln!("FEEDHUB_TEST_REDIS_URL not set; skipping");
        return;
    };
    let cache = RedisCache::connect(&url, "feedhub-test:").await.unwrap();
    cache.ensure_ready().await.unwrap();
    contract(&cache).await;
}

#[tokio::test]
async fn postgres_backend_honours_contract() {
    let Ok(url) = std::env::var("FEEDHUB_TEST_DATABASE_URL") else {
        eprintln!("FEEDHUB_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let cache = PostgresCache::connect(&url, 2).await.unwrap();
    cache.ensure_ready().await.unwrap();
    cache.ensure_ready().await.unwrap();
    contract(&cache).await;

    let key = unique("purge");
    cache.set(&key, json!(1), 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(cache.purge_expired().await.unwrap() >= 1);
    cache.close().await.unwrap();
}
