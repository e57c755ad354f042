// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Event feeds: blocks, deduplicated transactions and combiner alerts.
//!
//! Feeds call registered [`Handler`]s and report exactly one terminal
//! [`FeedError`] per subscription through a oneshot receiver.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::errors::FeedError;
use crate::types::block::BlockEvent;

pub mod alerts;
pub mod blocks;
pub mod combiner_cache;
pub mod dedup;
pub mod transactions;

/// An async callback invoked once per event.
pub type Handler<T> = Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, Result<(), FeedError>> + Send + Sync>;

/// Wraps an async closure into a [`Handler`].
///
/// # Example
///
/// ```rust
/// use alertscan::feeds::{handler_fn, Handler};
/// use alertscan::BlockEvent;
///
/// let handler: Handler<BlockEvent> = handler_fn(|event: std::sync::Arc<BlockEvent>| async move {
///     tracing::info!(block_number = event.block.number, "block");
///     Ok(())
/// });
/// ```
pub fn handler_fn<T, F, Fut>(f: F) -> Handler<T>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FeedError>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Anything that emits ordered block events to subscribers.
///
/// Implemented by [`blocks::BlockFeed`]; the transaction feed depends only on
/// this trait.
pub trait BlockSource: Send + Sync {
    /// Registers `handler`; the receiver yields the terminal error once the
    /// source stops calling it.
    fn subscribe(&self, handler: Handler<BlockEvent>) -> oneshot::Receiver<FeedError>;

    /// Stops the source; pending subscribers receive [`FeedError::Cancelled`].
    fn stop(&self);
}
