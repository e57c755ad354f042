// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Span creation helpers for alertscan operations.
//!
//! Telemetry is kept out of business logic: each instrumented operation has a
//! span helper here, and the async code attaches it with
//! [`tracing::Instrument`].
//!
//! Usage pattern:
//! ```rust,ignore
//! use tracing::Instrument;
//!
//! async fn fetch(&self, number: u64) -> Result<BlockEvent, RpcError> {
//!     async move {
//!         // Business logic here
//!     }
//!     .instrument(spans::fetch_block_event(number))
//!     .await
//! }
//! ```

use alloy_primitives::{BlockNumber, B256};
use tracing::{Level, Span};

/// Create span for fetching one block with its logs and traces.
///
/// Parent: block_feed span
#[inline]
pub(crate) fn fetch_block_event(block_number: BlockNumber) -> Span {
    tracing::debug_span!("alertscan.fetch_block_event", block_number = block_number)
}

/// Create span for the block feed run loop.
///
/// Parent: None (root span for the feed task)
/// Children: fetch_block_event spans (one per block)
#[inline]
pub(crate) fn block_feed(start: Option<BlockNumber>, end: Option<BlockNumber>, offset: u64) -> Span {
    tracing::span!(
        Level::INFO,
        "alertscan.block_feed",
        start = ?start,
        end = ?end,
        offset = offset,
    )
}

/// Create span for splitting one block into transaction events.
#[inline]
pub(crate) fn split_block(block_number: BlockNumber, block_hash: B256, tx_count: usize) -> Span {
    tracing::trace_span!(
        "alertscan.split_block",
        block_number = block_number,
        block_hash = %block_hash,
        tx_count = tx_count,
    )
}

/// Create span for a transaction feed worker.
#[inline]
pub(crate) fn transaction_worker(worker: usize) -> Span {
    tracing::debug_span!("alertscan.transaction_worker", worker = worker)
}

/// Create span for turning one bot result into alerts.
///
/// Parent: None (one span per result)
#[inline]
pub(crate) fn process_bot_result(analyzer: &'static str, bot_id: &str, request_id: &str) -> Span {
    tracing::debug_span!(
        "alertscan.process_bot_result",
        analyzer = analyzer,
        bot_id = %bot_id,
        request_id = %request_id,
    )
}

/// Create span for one combiner alert query.
#[inline]
pub(crate) fn poll_combiner_alerts(subscriptions: usize) -> Span {
    tracing::debug_span!("alertscan.poll_combiner_alerts", subscriptions = subscriptions)
}
