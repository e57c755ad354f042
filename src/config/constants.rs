// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Pipeline constants
//!
//! Values shared by every node in the network live here. Changing the alert
//! constants breaks cross-node verification of alerts.

use std::time::Duration;

/// Capacity of the block channel between the block relay and the splitter.
pub const BLOCK_CHANNEL_CAPACITY: usize = 10;

/// Capacity of the transaction channel between the splitter and the workers.
pub const TX_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the alert event channel of the combiner stream.
pub const ALERT_CHANNEL_CAPACITY: usize = 100;

/// Number of transaction hashes remembered for deduplication.
pub const TX_DEDUP_CACHE_CAPACITY: usize = 1_000_000;

/// Maximum number of addresses kept on a finding after truncation.
pub const MAX_ADDRESSES_PER_ALERT: usize = 50;

/// False-positive rate of every alert address bloom filter.
pub const ADDRESS_BLOOM_FILTER_FP_RATE: f64 = 0.001;

/// Look-back window used when querying alerts for combiner bots.
pub const DEFAULT_LOOK_BACK_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Time-to-live of a combiner alert cache entry under the default window.
pub const COMBINER_CACHE_TTL: Duration = combiner_cache_ttl(DEFAULT_LOOK_BACK_WINDOW);

/// Combiner cache entry lifetime for a look-back window.
pub const fn combiner_cache_ttl(look_back_window: Duration) -> Duration {
    look_back_window.saturating_mul(2)
}

/// How often expired combiner cache entries are purged.
pub const COMBINER_CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between combiner alert queries.
pub const DEFAULT_COMBINER_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default wait before polling again for a block that does not exist yet.
pub const DEFAULT_BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default maximum age of a block before the feed skips to the chain head.
pub const DEFAULT_MAX_BLOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Alert timestamp format: RFC 3339 with nanoseconds.
pub const ALERT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Bus subject carrying new combiner subscriptions.
pub const SUBJECT_AGENTS_ALERT_SUBSCRIBE: &str = "agents.alert.subscribe";

/// Bus subject carrying removed combiner subscriptions.
pub const SUBJECT_AGENTS_ALERT_UNSUBSCRIBE: &str = "agents.alert.unsubscribe";

/// Bus subject for per-agent metrics.
pub const SUBJECT_METRIC_AGENT: &str = "metric.agent";
