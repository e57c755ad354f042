// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Combiner alert cache with an optional JSON snapshot.
//!
//! Remembers which (subscriber, source alert) pairs were already delivered so
//! overlapping look-back queries do not deliver an alert twice. Entries live
//! for twice the look-back window ([`COMBINER_CACHE_TTL`] by default).
//!
//! The snapshot maps each key to its expiration and creation time in unix
//! nanoseconds:
//!
//! ```json
//! { "0xbot|repo/image@sha256:..|0xalerthash": { "expiration": 1700000120000000000, "created": 1700000000000000000 } }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::constants::COMBINER_CACHE_TTL;
use crate::errors::CacheError;
use crate::types::cache::TimestampNanos;
use crate::types::combiner::{BotInfo, CombinerBotSubscription, UpstreamAlert};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CacheEntry {
    expiration: TimestampNanos,
    created: TimestampNanos,
}

impl CacheEntry {
    fn new(ttl: Duration) -> Self {
        let created = TimestampNanos::now();
        Self {
            expiration: created.saturating_add(ttl),
            created,
        }
    }

    fn is_expired(&self) -> bool {
        self.expiration.is_past()
    }
}

/// TTL set of delivered combiner alerts.
///
/// # Example
///
/// ```rust
/// use alertscan::feeds::combiner_cache::CombinerAlertCache;
/// use alertscan::types::combiner::BotInfo;
///
/// let cache = CombinerAlertCache::in_memory();
/// let subscriber = BotInfo { bot_id: "0xsub".into(), ..Default::default() };
/// let key = CombinerAlertCache::key(&subscriber, "0xabc");
///
/// assert!(!cache.exists(&key));
/// cache.set(&key);
/// assert!(cache.exists(&key));
/// ```
#[derive(Debug)]
pub struct CombinerAlertCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    path: Option<PathBuf>,
}

impl CombinerAlertCache {
    /// Creates an empty cache that is never persisted on its own.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: COMBINER_CACHE_TTL,
            path: None,
        }
    }

    /// Creates a cache, loading the snapshot at `path` when given.
    ///
    /// A missing snapshot is created empty. A snapshot that cannot be parsed
    /// is replaced by an empty one and the cache starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the snapshot cannot be read or
    /// (re)created.
    pub fn new(path: Option<PathBuf>) -> Result<Self, CacheError> {
        let Some(path) = path else {
            return Ok(Self::in_memory());
        };
        let entries = load_snapshot(&path)?;
        Ok(Self {
            entries: Mutex::new(entries),
            ttl: COMBINER_CACHE_TTL,
            path: Some(path),
        })
    }

    /// Overrides the entry lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builds the cache key for a subscriber and a source alert hash.
    pub fn key(subscriber: &BotInfo, alert_hash: &str) -> String {
        format!(
            "{}|{}|{}",
            subscriber.bot_id, subscriber.bot_image, alert_hash
        )
    }

    /// Lifetime given to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Snapshot path given at construction.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns `true` if `key` was set and has not expired.
    pub fn exists(&self, key: &str) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Records `key` with a fresh expiration.
    pub fn set(&self, key: &str) {
        self.lock().insert(key.to_string(), CacheEntry::new(self.ttl));
    }

    /// Returns `true` if `alert` was already delivered to the subscriber.
    pub fn exists_for(&self, subscription: &CombinerBotSubscription, alert: &UpstreamAlert) -> bool {
        self.exists(&Self::key(&subscription.subscriber, &alert.hash))
    }

    /// Records `alert` as delivered to the subscriber.
    pub fn set_for(&self, subscription: &CombinerBotSubscription, alert: &UpstreamAlert) {
        self.set(&Self::key(&subscription.subscriber, &alert.hash));
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, remaining = entries.len(), "Purged expired combiner cache entries");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes all unexpired entries to `path`, replacing it atomically.
    pub async fn dump_to_file(&self, path: &Path) -> Result<(), CacheError> {
        let snapshot: HashMap<String, CacheEntry> = self
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| (key.clone(), *entry))
            .collect();
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| CacheError::serialize(path.display().to_string(), e))?;

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json)
            .await
            .map_err(|e| CacheError::io(temp_path.display().to_string(), e))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| CacheError::io(path.display().to_string(), e))?;

        info!(
            path = %path.display(),
            entries = snapshot.len(),
            "Saved combiner alert cache"
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_snapshot(path: &Path) -> Result<HashMap<String, CacheEntry>, CacheError> {
    let shown = path.display().to_string();
    if !path.exists() {
        debug!(path = %shown, "Combiner cache file does not exist, creating it");
        write_empty(path)?;
        return Ok(HashMap::new());
    }

    let raw = std::fs::read(path).map_err(|e| CacheError::io(shown.clone(), e))?;
    let entries: HashMap<String, CacheEntry> = match serde_json::from_slice(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                path = %shown,
                error = %err,
                "Failed to parse combiner cache file, starting empty"
            );
            std::fs::remove_file(path).map_err(|e| CacheError::io(shown.clone(), e))?;
            write_empty(path)?;
            return Ok(HashMap::new());
        }
    };

    let total = entries.len();
    let live: HashMap<_, _> = entries
        .into_iter()
        .filter(|(_, entry)| !entry.is_expired())
        .collect();
    info!(
        path = %shown,
        entries = live.len(),
        expired = total - live.len(),
        "Loaded combiner alert cache"
    );
    Ok(live)
}

fn write_empty(path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(parent.display().to_string(), e))?;
    }
    std::fs::write(path, b"{}").map_err(|e| CacheError::io(path.display().to_string(), e))
}
