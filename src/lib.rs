// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Event pipeline of a blockchain security-monitoring scanner node.
//!
//! Blocks flow from a [`ChainSource`] through the block feed and the
//! deduplicating transaction feed into the analyzers, which send every event
//! to the bots and turn their findings into content-addressed [`Alert`]s.
//! Combiner bots subscribe to alerts of other bots through the combiner feed.
//!
//! ```text
//! ChainSource ─▶ BlockFeed ─▶ TransactionFeed ─▶ TxStreamService ─▶ Tx/Block analyzers ─▶ AlertSender
//! AlertSource ─▶ CombinerFeed ─▶ CombinerAlertStreamService ─▶ combiner analyzer ─▶ AlertSender
//! ```
//!
//! Bot transport, alert signing and the alert query API are supplied by the
//! caller through [`RequestSender`], [`AlertSender`], [`MessageClient`] and
//! [`AlertSource`].

pub mod alerts;
pub mod analyzer;
pub mod chain;
pub mod config;
pub mod errors;
pub mod feeds;
pub mod health;
pub mod messaging;
pub mod streams;
pub mod transport;
pub mod types;

mod tracing;

pub use alerts::{truncate_finding, AddressBloomFilter, BotIdentity};
pub use analyzer::{
    AgentConfig, AgentRoundTrip, AlertSender, AnalyzerHandle, BlockAnalyzerService,
    CombinerAlertAnalyzerService, RequestSender, TxAnalyzerService,
};
pub use chain::{rpc::RpcChainSource, ChainSource, Head};
pub use config::{ScannerConfig, ScannerConfigBuilder};
pub use errors::{AnalyzerError, CacheError, FeedError, MessagingError, RpcError, ScannerError};
pub use feeds::alerts::{AlertSource, CombinerFeed};
pub use feeds::blocks::BlockFeed;
pub use feeds::combiner_cache::CombinerAlertCache;
pub use feeds::transactions::TransactionFeed;
pub use feeds::{handler_fn, BlockSource, Handler};
pub use health::{Reporter, Reports};
pub use messaging::{MessageClient, SubscriptionMessage};
pub use streams::{CombinerAlertStreamService, TxStreamService};
pub use transport::{RetryConfig, RetryLayer};
pub use types::alert::{Alert, AlertType, Finding};
pub use types::block::{Block, BlockEvent, TrackingTimestamps, Transaction, TransactionEvent};
pub use types::cache::TimestampNanos;
pub use types::combiner::{AlertEvent, CombinerBotSubscription};
