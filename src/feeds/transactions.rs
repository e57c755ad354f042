// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Deduplicating transaction feed.
//!
//! [`TransactionFeed::for_each_transaction`] runs one task group made of
//! three stages joined by bounded channels:
//!
//! ```text
//! BlockSource ──▶ relay ──[blocks]──▶ splitter ──[txs]──▶ worker × N ──▶ handler
//! ```
//!
//! The relay subscribes to the block source and optionally calls a block
//! handler. The splitter drops stale blocks and transactions seen before, and
//! preserves block order up to the point where workers pick events up. With a
//! single worker the handler sees transactions in total order.
//!
//! The first task to fail cancels the rest of the group and its error is
//! returned. A bounded block range that ends normally is a success.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, Instrument};

use super::dedup::TxDedupCache;
use super::{handler_fn, BlockSource, Handler};
use crate::config::TransactionFeedConfig;
use crate::errors::FeedError;
use crate::tracing::spans;
use crate::types::block::{BlockEvent, TransactionEvent};

/// Sender shared between the relay task and its block handler so the relay
/// can close the block channel once the source stops.
type SharedSender = Arc<Mutex<Option<mpsc::Sender<Arc<BlockEvent>>>>>;

/// Splits blocks from a [`BlockSource`] into deduplicated transaction events.
///
/// # Example
///
/// ```rust,ignore
/// use alertscan::feeds::{handler_fn, transactions::TransactionFeed};
///
/// let feed = TransactionFeed::new(block_feed, config.transaction_feed, token.child_token())?;
/// feed.for_each_transaction(None, handler_fn(|tx| async move {
///     tracing::info!(hash = %tx.transaction.hash, "transaction");
///     Ok(())
/// }))
/// .await?;
/// ```
pub struct TransactionFeed {
    blocks: Arc<dyn BlockSource>,
    config: TransactionFeedConfig,
    cache: Arc<TxDedupCache>,
    token: CancellationToken,
}

impl TransactionFeed {
    /// Creates a feed over `blocks`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidWorkerCount`] when `config.workers` is zero.
    pub fn new(
        blocks: Arc<dyn BlockSource>,
        config: TransactionFeedConfig,
        token: CancellationToken,
    ) -> Result<Self, FeedError> {
        if config.workers == 0 {
            return Err(FeedError::InvalidWorkerCount);
        }
        Ok(Self {
            blocks,
            cache: Arc::new(TxDedupCache::new(config.dedup_cache_capacity)),
            config,
            token,
        })
    }

    pub fn config(&self) -> &TransactionFeedConfig {
        &self.config
    }

    /// Number of transaction hashes currently remembered.
    pub fn seen_transactions(&self) -> usize {
        self.cache.len()
    }

    /// Runs the relay, splitter and workers until the block source stops, a
    /// task fails, or the feed is cancelled.
    ///
    /// `block_handler` is called for every block after it was queued for
    /// splitting; `tx_handler` is called once per new transaction.
    pub async fn for_each_transaction(
        &self,
        block_handler: Option<Handler<BlockEvent>>,
        tx_handler: Handler<TransactionEvent>,
    ) -> Result<(), FeedError> {
        let workers = self.config.workers;
        if workers == 0 {
            return Err(FeedError::InvalidWorkerCount);
        }

        let group = self.token.child_token();
        let (block_tx, block_rx) = mpsc::channel(self.config.block_channel_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(self.config.tx_channel_capacity.max(1));
        let event_rx = Arc::new(AsyncMutex::new(event_rx));

        let mut tasks = JoinSet::new();
        tasks.spawn(relay(
            Arc::clone(&self.blocks),
            Arc::new(Mutex::new(Some(block_tx))),
            block_handler,
            group.clone(),
        ));
        tasks.spawn(split(
            block_rx,
            event_tx,
            Arc::clone(&self.cache),
            self.config.clone(),
            group.clone(),
        ));
        for worker in 0..workers {
            tasks.spawn(
                work(
                    Arc::clone(&event_rx),
                    Arc::clone(&tx_handler),
                    group.clone(),
                )
                .instrument(spans::transaction_worker(worker)),
            );
        }
        info!(workers, "Transaction feed started");

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined.map_err(FeedError::from).and_then(|outcome| outcome) {
                if result.is_ok() {
                    debug!(error = %err, "Transaction feed task failed, cancelling group");
                    result = Err(err);
                }
                group.cancel();
            }
        }
        result
    }
}

async fn relay(
    blocks: Arc<dyn BlockSource>,
    sender: SharedSender,
    block_handler: Option<Handler<BlockEvent>>,
    group: CancellationToken,
) -> Result<(), FeedError> {
    let handler = {
        let sender = Arc::clone(&sender);
        let group = group.clone();
        handler_fn(move |event: Arc<BlockEvent>| {
            let sender = sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let block_handler = block_handler.clone();
            let group = group.clone();
            async move {
                let Some(sender) = sender else {
                    return Err(FeedError::Cancelled);
                };
                tokio::select! {
                    biased;
                    _ = group.cancelled() => return Err(FeedError::Cancelled),
                    sent = sender.send(Arc::clone(&event)) => {
                        sent.map_err(|_| FeedError::Cancelled)?;
                    }
                }
                if let Some(block_handler) = block_handler {
                    block_handler(event).await?;
                }
                Ok(())
            }
        })
    };

    let done = blocks.subscribe(handler);
    let terminal = tokio::select! {
        biased;
        _ = group.cancelled() => {
            // The source runs on its own token and would keep fetching.
            blocks.stop();
            FeedError::Cancelled
        }
        terminal = done => terminal.unwrap_or_else(|_| {
            FeedError::TaskFailed("block source dropped the subscription".to_string())
        }),
    };

    // Closes the block channel so the splitter drains and stops.
    sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    match terminal {
        FeedError::EndBlockReached => {
            info!("Block range finished");
            Ok(())
        }
        err => Err(err),
    }
}

async fn split(
    mut blocks: mpsc::Receiver<Arc<BlockEvent>>,
    events: mpsc::Sender<Arc<TransactionEvent>>,
    cache: Arc<TxDedupCache>,
    config: TransactionFeedConfig,
    group: CancellationToken,
) -> Result<(), FeedError> {
    loop {
        let block = tokio::select! {
            biased;
            _ = group.cancelled() => return Err(FeedError::Cancelled),
            block = blocks.recv() => match block {
                Some(block) => block,
                None => return Ok(()),
            },
        };

        if let Some(max_age) = config.max_block_age {
            if block.block.is_older_than(max_age, Utc::now()) {
                debug!(block_number = block.block.number, "Dropping stale block");
                continue;
            }
        }

        let span = spans::split_block(
            block.block.number,
            block.block.hash,
            block.block.transactions.len(),
        );
        split_block(&block, &events, &cache, &group)
            .instrument(span)
            .await?;
    }
}

async fn split_block(
    block: &Arc<BlockEvent>,
    events: &mpsc::Sender<Arc<TransactionEvent>>,
    cache: &TxDedupCache,
    group: &CancellationToken,
) -> Result<(), FeedError> {
    for transaction in &block.block.transactions {
        if !cache.check_and_insert(transaction.hash) {
            trace!(hash = %transaction.hash, "Skipping duplicate transaction");
            continue;
        }
        let event = Arc::new(TransactionEvent::new(
            Arc::clone(block),
            transaction.clone(),
            Utc::now(),
        ));
        tokio::select! {
            biased;
            _ = group.cancelled() => return Err(FeedError::Cancelled),
            sent = events.send(event) => sent.map_err(|_| FeedError::Cancelled)?,
        }
    }
    Ok(())
}

async fn work(
    events: Arc<AsyncMutex<mpsc::Receiver<Arc<TransactionEvent>>>>,
    handler: Handler<TransactionEvent>,
    group: CancellationToken,
) -> Result<(), FeedError> {
    loop {
        let next = {
            let mut events = events.lock().await;
            tokio::select! {
                biased;
                _ = group.cancelled() => return Err(FeedError::Cancelled),
                event = events.recv() => event,
            }
        };
        let Some(event) = next else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = group.cancelled() => return Err(FeedError::Cancelled),
            handled = handler(event) => handled?,
        }
    }
}
