// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Sequential block feed.
//!
//! The feed walks block numbers upward from a start block (or the chain head)
//! and emits one [`BlockEvent`] per block to every subscriber, in order.
//!
//! - **Polling**: a block that does not exist yet is asked for again after
//!   `poll_interval`.
//! - **Head subscription**: while the feed is ahead of the latest announced
//!   head it waits for the next announcement, with the poll interval as a
//!   fallback.
//! - **Offset**: block `n` is checked but block `n - offset` is emitted, giving
//!   trace APIs time to catch up.
//! - **Staleness**: a checked block older than `max_block_age` is skipped and
//!   the feed jumps to the chain head.
//!
//! RPC failures are retried with exponential backoff and never move the
//! cursor. Handler errors and cancellation end the feed and are delivered to
//! every subscriber.

use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_rpc_types::Filter;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::{BlockSource, Handler};
use crate::chain::ChainSource;
use crate::config::BlockFeedConfig;
use crate::errors::{FeedError, RpcError};
use crate::health::{MessageTracker, Reporter, Reports, TimeTracker};
use crate::tracing::spans;
use crate::transport::calculate_backoff;
use crate::types::block::{Block, BlockEvent, TrackingTimestamps};

/// Latest announced head, `None` until the first announcement.
type HeadReceiver = watch::Receiver<Option<u64>>;

struct Subscriber {
    handler: Handler<BlockEvent>,
    done: oneshot::Sender<FeedError>,
}

#[derive(Default)]
struct Subscribers {
    active: Vec<Subscriber>,
    /// Set once the feed stops; later subscribers receive it immediately.
    terminal: Option<FeedError>,
}

#[derive(Debug, Clone, Copy)]
struct FeedRange {
    start: Option<u64>,
    end: Option<u64>,
    rate: Option<Duration>,
}

/// Emits ordered block events from a [`ChainSource`].
///
/// # Example
///
/// ```rust,ignore
/// use alertscan::feeds::{blocks::BlockFeed, handler_fn, BlockSource};
///
/// let feed = Arc::new(BlockFeed::new(1, client, config.block_feed, token.child_token()));
/// let done = feed.subscribe(handler_fn(|event| async move { Ok(()) }));
/// feed.start();
/// let terminal = done.await;
/// ```
pub struct BlockFeed {
    chain_id: u64,
    client: Arc<dyn ChainSource>,
    trace_client: Arc<dyn ChainSource>,
    config: BlockFeedConfig,
    token: CancellationToken,
    subscribers: Mutex<Subscribers>,
    started: AtomicBool,
    last_checked: TimeTracker,
    last_checked_block: MessageTracker,
}

impl BlockFeed {
    /// Creates a feed that reads blocks, logs and traces from `client`.
    pub fn new(
        chain_id: u64,
        client: Arc<dyn ChainSource>,
        config: BlockFeedConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            chain_id,
            trace_client: client.clone(),
            client,
            config,
            token,
            subscribers: Mutex::new(Subscribers::default()),
            started: AtomicBool::new(false),
            last_checked: TimeTracker::new(),
            last_checked_block: MessageTracker::new(),
        }
    }

    /// Reads traces from a separate source (e.g. an archive node).
    pub fn with_trace_client(mut self, trace_client: Arc<dyn ChainSource>) -> Self {
        self.trace_client = trace_client;
        self
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Starts the feed over the configured range.
    pub fn start(self: &Arc<Self>) {
        let range = FeedRange {
            start: self.config.start,
            end: self.config.end,
            rate: self.config.rate_limit,
        };
        self.spawn(range);
    }

    /// Starts the feed over `start..=end`, pacing blocks at least `rate` apart.
    pub fn start_range(self: &Arc<Self>, start: u64, end: u64, rate: Duration) {
        let range = FeedRange {
            start: Some(start),
            end: Some(end),
            rate: (!rate.is_zero()).then_some(rate),
        };
        self.spawn(range);
    }

    fn spawn(self: &Arc<Self>, range: FeedRange) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Block feed already started");
            return;
        }
        let feed = Arc::clone(self);
        let span = spans::block_feed(range.start, range.end, self.config.offset);
        tokio::spawn(
            async move {
                let err = match feed.run(range).await {
                    Ok(never) => match never {},
                    Err(err) => err,
                };
                feed.finish(err);
            }
            .instrument(span),
        );
    }

    /// Delivers the terminal error to every subscriber.
    fn finish(&self, err: FeedError) {
        if err.is_cancelled() || err.is_end_of_range() {
            info!(error = %err, "Block feed stopped");
        } else {
            warn!(error = %err, "Block feed stopped");
        }
        let subscribers = {
            let mut guard = self.lock_subscribers();
            guard.terminal = Some(err.clone());
            std::mem::take(&mut guard.active)
        };
        for subscriber in subscribers {
            let _ = subscriber.done.send(err.clone());
        }
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> Vec<Handler<BlockEvent>> {
        self.lock_subscribers()
            .active
            .iter()
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    async fn run(&self, range: FeedRange) -> Result<Infallible, FeedError> {
        let offset = self.config.offset;
        let mut head_rx = self.config.use_head_subscription.then(|| self.listen_for_heads());
        let mut attempt = 0u32;

        let mut current = match range.start {
            Some(start) => start,
            None => self.chain_head(&mut attempt).await?,
        };
        info!(start = current, end = ?range.end, offset, "Block feed started");

        loop {
            if self.token.is_cancelled() {
                return Err(FeedError::Cancelled);
            }
            if let Some(end) = range.end {
                if current.saturating_sub(offset) > end {
                    return Err(FeedError::EndBlockReached);
                }
            }

            if is_behind_head(&mut head_rx, current) {
                self.wait_for_head(&mut head_rx).await?;
            }

            let checked = match self.cancellable(self.client.block_by_number(current)).await? {
                Ok(Some(block)) => block,
                Ok(None) => {
                    debug!(block_number = current, "Block not produced yet");
                    self.wait_for_head(&mut head_rx).await?;
                    continue;
                }
                Err(err) => {
                    warn!(block_number = current, error = %err, "Failed to fetch block, retrying");
                    self.backoff(&mut attempt).await?;
                    continue;
                }
            };
            self.last_checked.set();
            self.last_checked_block.set(current.to_string());

            if let Some(max_age) = self.config.max_block_age {
                if checked.is_older_than(max_age, Utc::now()) {
                    let head = match self.cancellable(self.client.block_number()).await? {
                        Ok(head) => head,
                        Err(err) => {
                            warn!(error = %err, "Failed to fetch chain head, retrying");
                            self.backoff(&mut attempt).await?;
                            continue;
                        }
                    };
                    // A halted chain keeps producing the same stale head; emit it.
                    if head > current {
                        info!(
                            stale_block = current,
                            head, "Block is too old, skipping to chain head"
                        );
                        current = head;
                        continue;
                    }
                }
            }

            let Some(target) = current.checked_sub(offset) else {
                current += 1;
                continue;
            };

            let block = if offset == 0 {
                checked
            } else {
                match self.cancellable(self.client.block_by_number(target)).await? {
                    Ok(Some(block)) => block,
                    Ok(None) => {
                        warn!(block_number = target, "Offset block missing, retrying");
                        self.backoff(&mut attempt).await?;
                        continue;
                    }
                    Err(err) => {
                        warn!(block_number = target, error = %err, "Failed to fetch offset block, retrying");
                        self.backoff(&mut attempt).await?;
                        continue;
                    }
                }
            };

            let event = match self
                .cancellable(self.fetch_event(block).instrument(spans::fetch_block_event(target)))
                .await?
            {
                Ok(event) => event,
                Err(err) => {
                    warn!(block_number = target, error = %err, "Failed to fetch block data, retrying");
                    self.backoff(&mut attempt).await?;
                    continue;
                }
            };
            attempt = 0;

            self.deliver(Arc::new(event)).await?;

            if range.end == Some(target) {
                return Err(FeedError::EndBlockReached);
            }
            current += 1;

            if let Some(rate) = range.rate {
                self.sleep(rate).await?;
            }
        }
    }

    async fn deliver(&self, event: Arc<BlockEvent>) -> Result<(), FeedError> {
        for handler in self.handlers() {
            self.cancellable(handler(Arc::clone(&event))).await??;
        }
        Ok(())
    }

    async fn fetch_event(&self, block: Block) -> Result<BlockEvent, RpcError> {
        let logs = self
            .client
            .logs(&Filter::new().at_block_hash(block.hash))
            .await?;
        let traces = if self.config.tracing {
            self.trace_client.trace_block(block.number).await?
        } else {
            Vec::new()
        };
        debug!(
            block_number = block.number,
            logs = logs.len(),
            traces = traces.len(),
            "Fetched block data"
        );
        Ok(BlockEvent {
            chain_id: self.chain_id,
            block,
            logs,
            traces,
            timestamps: TrackingTimestamps {
                block: Some(Utc::now()),
                ..Default::default()
            },
        })
    }

    async fn chain_head(&self, attempt: &mut u32) -> Result<u64, FeedError> {
        loop {
            match self.cancellable(self.client.block_number()).await? {
                Ok(head) => return Ok(head),
                Err(err) => {
                    warn!(error = %err, "Failed to fetch chain head, retrying");
                    self.backoff(attempt).await?;
                }
            }
        }
    }

    /// Spawns a task publishing announced heads; it stops with the feed.
    fn listen_for_heads(&self) -> HeadReceiver {
        let (tx, rx) = watch::channel(None);
        let client = Arc::clone(&self.client);
        let token = self.token.child_token();
        tokio::spawn(async move {
            let mut heads = match client.subscribe_to_head().await {
                Ok(heads) => heads,
                Err(err) => {
                    warn!(error = %err, "Head subscription unavailable, polling only");
                    return;
                }
            };
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    head = heads.next() => match head {
                        Some(head) => {
                            debug!(block_number = head.number, "New head");
                            tx.send_if_modified(|latest| {
                                if latest.is_none_or(|latest| head.number > latest) {
                                    *latest = Some(head.number);
                                    true
                                } else {
                                    false
                                }
                            });
                        }
                        None => {
                            warn!("Head subscription ended, polling only");
                            return;
                        }
                    },
                }
            }
        });
        rx
    }

    /// Waits for a newer head or one poll interval, whichever comes first.
    async fn wait_for_head(&self, head_rx: &mut Option<HeadReceiver>) -> Result<(), FeedError> {
        let poll = self.config.poll_interval;
        let lost = match head_rx.as_mut() {
            Some(rx) => tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(FeedError::Cancelled),
                changed = rx.changed() => changed.is_err(),
                _ = tokio::time::sleep(poll) => false,
            },
            None => {
                self.sleep(poll).await?;
                false
            }
        };
        if lost {
            *head_rx = None;
        }
        Ok(())
    }

    async fn backoff(&self, attempt: &mut u32) -> Result<(), FeedError> {
        let delay = calculate_backoff(*attempt, &self.config.retry);
        *attempt = attempt.saturating_add(1);
        self.sleep(delay).await
    }

    async fn sleep(&self, duration: Duration) -> Result<(), FeedError> {
        self.cancellable(tokio::time::sleep(duration)).await
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, FeedError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FeedError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

fn is_behind_head(head_rx: &mut Option<HeadReceiver>, current: u64) -> bool {
    match head_rx.as_mut() {
        Some(rx) => matches!(*rx.borrow_and_update(), Some(head) if head < current),
        None => false,
    }
}

impl BlockSource for BlockFeed {
    fn subscribe(&self, handler: Handler<BlockEvent>) -> oneshot::Receiver<FeedError> {
        let (done, rx) = oneshot::channel();
        let mut guard = self.lock_subscribers();
        match &guard.terminal {
            Some(err) => {
                let _ = done.send(err.clone());
            }
            None => guard.active.push(Subscriber { handler, done }),
        }
        rx
    }

    fn stop(&self) {
        self.token.cancel();
        // A feed that never ran has no loop left to report the cancellation.
        if !self.started.swap(true, Ordering::SeqCst) {
            self.finish(FeedError::Cancelled);
        }
    }
}

impl Reporter for BlockFeed {
    fn name(&self) -> &str {
        "block-feed"
    }

    fn health(&self) -> Reports {
        vec![
            self.last_checked.report("event.checked.time"),
            self.last_checked_block.report("event.checked.block"),
        ]
    }
}
