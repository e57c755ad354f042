// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the alertscan library.
//!
//! The layout mirrors the pipeline:
//!
//! - **Module-specific errors** for fine-grained handling ([`FeedError`],
//!   [`AnalyzerError`], [`CacheError`], [`MessagingError`])
//! - [`RpcError`] for chain data source failures, shared by the feeds and the
//!   RPC adapter
//! - **Unified error type** ([`ScannerError`]) for callers that only need to
//!   report a failure
//!
//! # Error taxonomy
//!
//! - Transient I/O ([`RpcError`]) is retried by the block feed with exponential
//!   backoff and never advances the cursor.
//! - Handler errors ([`FeedError::Handler`]) are terminal for the owning feed.
//! - Delivery failures ([`AnalyzerError::Delivery`]) are fatal and surface to
//!   the supervisor.
//! - Per-finding conversion failures ([`AnalyzerError::Transform`]) are logged
//!   and skipped.
//! - A corrupt combiner cache file is recovered by starting empty.
//!
//! # Examples
//!
//! ```rust,ignore
//! use alertscan::{FeedError, ScannerError};
//!
//! async fn run(feed: TransactionFeed) -> Result<(), ScannerError> {
//!     match feed.for_each_transaction(None, handler).await {
//!         Ok(()) => Ok(()),
//!         Err(FeedError::Cancelled) => Ok(()),
//!         Err(e) => Err(e.into()),
//!     }
//! }
//! ```

mod analyzer;
mod cache;
mod feed;
mod messaging;
mod rpc;

pub use analyzer::AnalyzerError;
pub use cache::CacheError;
pub use feed::FeedError;
pub use messaging::MessagingError;
pub use rpc::RpcError;

/// Unified error type for all alertscan operations.
///
/// All module-specific error types convert into `ScannerError` via `From`, so
/// `?` works across module boundaries.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// Error from a chain data source.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Terminal error from a feed.
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Error from an analyzer service.
    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    /// Error from the combiner alert cache.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error at the messaging boundary.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
}
