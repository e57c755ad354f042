// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Bounded transaction hash dedup cache.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use alloy_primitives::B256;
use lru::LruCache;

/// Remembers the most recently seen transaction hashes.
///
/// The least recently seen hash is evicted once capacity is reached, so a
/// transaction replayed long after its first sighting may be forwarded again.
#[derive(Debug)]
pub struct TxDedupCache {
    seen: Mutex<LruCache<B256, ()>>,
}

impl TxDedupCache {
    /// Creates a cache holding up to `capacity` hashes (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Records `hash` and returns `true` if it was not seen before.
    ///
    /// The lookup and the insert happen under one lock, so concurrent callers
    /// never both see the same hash as new.
    pub fn check_and_insert(&self, hash: B256) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.put(hash, ()).is_none()
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cap()
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_rejected() {
        let cache = TxDedupCache::new(10);
        let hash = B256::repeat_byte(1);
        assert!(cache.check_and_insert(hash));
        assert!(!cache.check_and_insert(hash));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicted_hash_is_new_again() {
        let cache = TxDedupCache::new(2);
        let (a, b, c) = (
            B256::repeat_byte(1),
            B256::repeat_byte(2),
            B256::repeat_byte(3),
        );
        assert!(cache.check_and_insert(a));
        assert!(cache.check_and_insert(b));
        assert!(cache.check_and_insert(c));
        assert!(cache.check_and_insert(a));
        assert!(!cache.check_and_insert(c));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = TxDedupCache::new(0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.is_empty());
    }
}
