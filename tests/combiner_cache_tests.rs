// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the combiner alert cache snapshot
//!
//! These tests exercise loading, saving and recovering the on-disk snapshot
//! through the public API.

use std::time::Duration;

use alertscan::types::combiner::BotInfo;
use alertscan::{CombinerAlertCache, TimestampNanos};
use tempfile::TempDir;

fn subscriber() -> BotInfo {
    BotInfo {
        bot_id: "0xcombiner".to_string(),
        bot_owner: "0xowner".to_string(),
        bot_image: "bafyimage".to_string(),
    }
}

/// Entries saved by one process are seen by the next
#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("combiner-cache.json");
    let key = CombinerAlertCache::key(&subscriber(), "0xalert");

    let cache = CombinerAlertCache::new(Some(path.clone())).unwrap();
    cache.set(&key);
    cache.dump_to_file(&path).await.unwrap();
    drop(cache);

    let reloaded = CombinerAlertCache::new(Some(path.clone())).unwrap();
    assert!(reloaded.exists(&key), "entry should survive a restart");
    assert_eq!(reloaded.len(), 1);
    assert!(
        !path.with_extension("tmp").exists(),
        "temporary file should be renamed into place"
    );
}

/// A missing snapshot is created empty
#[test]
fn test_missing_snapshot_is_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("cache.json");

    let cache = CombinerAlertCache::new(Some(path.clone())).unwrap();

    assert!(cache.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
}

/// A corrupt snapshot is replaced and the cache starts empty
#[test]
fn test_corrupt_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let cache = CombinerAlertCache::new(Some(path.clone())).unwrap();

    assert!(cache.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
}

/// Expired entries in a snapshot are dropped on load
#[test]
fn test_expired_snapshot_entries_are_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let future = TimestampNanos::now().saturating_add(Duration::from_secs(600));
    let snapshot = serde_json::json!({
        "live": { "expiration": future.as_nanos(), "created": 0 },
        "dead": { "expiration": 1, "created": 0 },
    });
    std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

    let cache = CombinerAlertCache::new(Some(path)).unwrap();

    assert_eq!(cache.len(), 1);
    assert!(cache.exists("live"));
    assert!(!cache.exists("dead"));
}

/// Saving skips entries that expired in memory
#[tokio::test]
async fn test_dump_skips_expired_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let cache = CombinerAlertCache::in_memory().with_ttl(Duration::ZERO);
    cache.set("gone");
    tokio::time::sleep(Duration::from_millis(2)).await;

    cache.dump_to_file(&path).await.unwrap();

    let saved: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved, serde_json::json!({}));
}

/// The same alert is cached separately per subscriber image
#[test]
fn test_keys_distinguish_subscriber_images() {
    let cache = CombinerAlertCache::in_memory();
    let mut upgraded = subscriber();
    upgraded.bot_image = "bafynewimage".to_string();

    cache.set(&CombinerAlertCache::key(&subscriber(), "0xalert"));

    assert!(!cache.exists(&CombinerAlertCache::key(&upgraded, "0xalert")));
}
