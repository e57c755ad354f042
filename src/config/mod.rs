// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the scanner pipeline
//!
//! Plain structs with defaults and a fluent builder. Every struct derives
//! `Deserialize` with `#[serde(default)]`, so an outer loader can read a
//! partial file and keep defaults for the rest. Nothing here reads files or
//! the environment.
//!
//! # Example: Using defaults
//!
//! ```rust
//! use alertscan::ScannerConfig;
//!
//! let config = ScannerConfig::default();
//! assert_eq!(config.transaction_feed.workers, 10);
//! ```
//!
//! # Example: Custom configuration
//!
//! ```rust
//! use alertscan::ScannerConfigBuilder;
//! use std::time::Duration;
//!
//! let config = ScannerConfigBuilder::with_defaults()
//!     .chain_id(137)
//!     .start_block(50_000_000)
//!     .offset(2)
//!     .workers(4)
//!     .max_block_age(Duration::from_secs(600))
//!     .build();
//! assert_eq!(config.block_feed.offset, 2);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::transport::RetryConfig;

pub mod constants;

use constants::{
    BLOCK_CHANNEL_CAPACITY, DEFAULT_BLOCK_POLL_INTERVAL, DEFAULT_COMBINER_POLL_INTERVAL,
    DEFAULT_LOOK_BACK_WINDOW, DEFAULT_MAX_BLOCK_AGE, TX_CHANNEL_CAPACITY,
    TX_DEDUP_CACHE_CAPACITY,
};

/// Default number of transaction workers
const DEFAULT_WORKERS: usize = 10;

/// Top-level configuration for one scanner node.
///
/// Use [`ScannerConfigBuilder`] for a fluent API to construct instances.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Chain being scanned
    /// Default: 1 (Ethereum mainnet)
    pub chain_id: u64,

    /// Block feed settings
    pub block_feed: BlockFeedConfig,

    /// Transaction feed settings
    pub transaction_feed: TransactionFeedConfig,

    /// Combiner alert feed settings
    pub combiner: CombinerConfig,
}

/// Block feed settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockFeedConfig {
    /// First block to fetch; `None` starts at the current chain head
    pub start: Option<u64>,

    /// Last block to emit; `None` follows the chain forever
    pub end: Option<u64>,

    /// Lag between the block checked and the block emitted
    /// Default: 0
    pub offset: u64,

    /// Minimum interval between two emitted blocks
    /// Default: None (no pacing)
    pub rate_limit: Option<Duration>,

    /// Wait before asking again for a block that does not exist yet
    /// Default: 1 second
    pub poll_interval: Duration,

    /// Fetch `trace_block` results for every emitted block
    /// Default: false
    pub tracing: bool,

    /// Listen for new heads instead of relying only on polling
    /// Default: false
    pub use_head_subscription: bool,

    /// Blocks older than this are skipped in favour of the chain head
    /// Default: 1 hour
    pub max_block_age: Option<Duration>,

    /// Backoff applied to failed block, log and trace fetches
    pub retry: RetryConfig,
}

/// Transaction feed settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionFeedConfig {
    /// Number of concurrent transaction handlers; must be > 0
    /// Default: 10
    pub workers: usize,

    /// Capacity of the block relay channel
    pub block_channel_capacity: usize,

    /// Capacity of the transaction channel
    pub tx_channel_capacity: usize,

    /// Number of transaction hashes remembered for deduplication
    pub dedup_cache_capacity: usize,

    /// Blocks older than this when split are dropped
    /// Default: 1 hour
    pub max_block_age: Option<Duration>,
}

/// Combiner alert feed settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Snapshot file for the combiner alert cache; `None` keeps it in memory
    pub cache_path: Option<PathBuf>,

    /// Interval between alert source queries
    /// Default: 15 seconds
    pub poll_interval: Duration,

    /// How far back each alert query looks
    /// Default: 10 minutes
    pub look_back_window: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            block_feed: BlockFeedConfig::default(),
            transaction_feed: TransactionFeedConfig::default(),
            combiner: CombinerConfig::default(),
        }
    }
}

impl Default for BlockFeedConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            offset: 0,
            rate_limit: None,
            poll_interval: DEFAULT_BLOCK_POLL_INTERVAL,
            tracing: false,
            use_head_subscription: false,
            max_block_age: Some(DEFAULT_MAX_BLOCK_AGE),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for TransactionFeedConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            block_channel_capacity: BLOCK_CHANNEL_CAPACITY,
            tx_channel_capacity: TX_CHANNEL_CAPACITY,
            dedup_cache_capacity: TX_DEDUP_CACHE_CAPACITY,
            max_block_age: Some(DEFAULT_MAX_BLOCK_AGE),
        }
    }
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            poll_interval: DEFAULT_COMBINER_POLL_INTERVAL,
            look_back_window: DEFAULT_LOOK_BACK_WINDOW,
        }
    }
}

impl ScannerConfig {
    /// Create minimal config: one worker, no staleness checks, short polls
    ///
    /// Suitable for tests and replaying fixed block ranges.
    ///
    /// # Example
    ///
    /// ```rust
    /// use alertscan::ScannerConfig;
    ///
    /// let config = ScannerConfig::minimal();
    /// assert_eq!(config.transaction_feed.workers, 1);
    /// assert!(config.block_feed.max_block_age.is_none());
    /// ```
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.block_feed.max_block_age = None;
        config.block_feed.poll_interval = Duration::from_millis(50);
        config.transaction_feed.workers = 1;
        config.transaction_feed.max_block_age = None;
        config.transaction_feed.dedup_cache_capacity = 10_000;
        config.combiner.poll_interval = Duration::from_millis(50);
        config
    }
}

/// Builder for [`ScannerConfig`] with a fluent API
///
/// # Example
///
/// ```rust
/// use alertscan::ScannerConfigBuilder;
///
/// let config = ScannerConfigBuilder::new()
///     .chain_id(10)
///     .tracing(true)
///     .build();
/// assert_eq!(config.chain_id, 10);
/// assert!(config.block_feed.tracing);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScannerConfigBuilder {
    config: ScannerConfig,
}

impl ScannerConfigBuilder {
    /// Create a new builder starting from [`ScannerConfig::default`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with default settings (alias of [`new`](Self::new))
    pub fn with_defaults() -> Self {
        Self::new()
    }

    /// Create a builder starting from [`ScannerConfig::minimal`]
    pub fn minimal() -> Self {
        Self {
            config: ScannerConfig::minimal(),
        }
    }

    /// Set the chain id
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.config.chain_id = chain_id;
        self
    }

    /// Set the first block to fetch
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.block_feed.start = Some(block);
        self
    }

    /// Set the last block to emit
    pub fn end_block(mut self, block: u64) -> Self {
        self.config.block_feed.end = Some(block);
        self
    }

    /// Set the lag between the checked block and the emitted block
    pub fn offset(mut self, offset: u64) -> Self {
        self.config.block_feed.offset = offset;
        self
    }

    /// Set the minimum interval between emitted blocks
    pub fn rate_limit(mut self, interval: Duration) -> Self {
        self.config.block_feed.rate_limit = Some(interval);
        self
    }

    /// Set the block poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.block_feed.poll_interval = interval;
        self
    }

    /// Enable or disable trace fetching
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.config.block_feed.tracing = enabled;
        self
    }

    /// Enable or disable the new-head subscription
    pub fn head_subscription(mut self, enabled: bool) -> Self {
        self.config.block_feed.use_head_subscription = enabled;
        self
    }

    /// Set the maximum block age for both the block feed and the splitter
    pub fn max_block_age(mut self, age: Duration) -> Self {
        self.config.block_feed.max_block_age = Some(age);
        self.config.transaction_feed.max_block_age = Some(age);
        self
    }

    /// Disable staleness checks
    pub fn no_max_block_age(mut self) -> Self {
        self.config.block_feed.max_block_age = None;
        self.config.transaction_feed.max_block_age = None;
        self
    }

    /// Set the block fetch retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.block_feed.retry = retry;
        self
    }

    /// Set the number of transaction workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.transaction_feed.workers = workers;
        self
    }

    /// Set the deduplication cache capacity
    pub fn dedup_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.transaction_feed.dedup_cache_capacity = capacity;
        self
    }

    /// Set the combiner alert cache snapshot path
    pub fn combiner_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.combiner.cache_path = Some(path.into());
        self
    }

    /// Set the combiner alert poll interval
    pub fn combiner_poll_interval(mut self, interval: Duration) -> Self {
        self.config.combiner.poll_interval = interval;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ScannerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.block_feed.offset, 0);
        assert_eq!(config.block_feed.max_block_age, Some(DEFAULT_MAX_BLOCK_AGE));
        assert_eq!(config.transaction_feed.tx_channel_capacity, 100);
        assert_eq!(config.transaction_feed.block_channel_capacity, 10);
        assert_eq!(config.combiner.look_back_window, DEFAULT_LOOK_BACK_WINDOW);
    }

    #[test]
    fn test_builder_sets_both_block_ages() {
        let config = ScannerConfigBuilder::new()
            .max_block_age(Duration::from_secs(30))
            .build();
        assert_eq!(config.block_feed.max_block_age, Some(Duration::from_secs(30)));
        assert_eq!(
            config.transaction_feed.max_block_age,
            Some(Duration::from_secs(30))
        );

        let config = ScannerConfigBuilder::new().no_max_block_age().build();
        assert!(config.block_feed.max_block_age.is_none());
        assert!(config.transaction_feed.max_block_age.is_none());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: ScannerConfig = serde_json::from_str(
            r#"{"chain_id": 137, "transaction_feed": {"workers": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.chain_id, 137);
        assert_eq!(config.transaction_feed.workers, 3);
        assert_eq!(config.transaction_feed.tx_channel_capacity, 100);
        assert!(config.combiner.cache_path.is_none());
    }
}
