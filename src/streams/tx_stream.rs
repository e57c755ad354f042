// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::forward;
use crate::errors::FeedError;
use crate::feeds::handler_fn;
use crate::feeds::transactions::TransactionFeed;
use crate::health::{Reporter, Reports, TimeTracker};
use crate::types::block::{BlockEvent, TransactionEvent};

type Senders = (
    mpsc::Sender<Arc<BlockEvent>>,
    mpsc::Sender<Arc<TransactionEvent>>,
);

/// Runs a [`TransactionFeed`] and emits its blocks and transactions on two
/// channels.
///
/// # Example
///
/// ```rust,ignore
/// let stream = Arc::new(TxStreamService::new(tx_feed, token.child_token()));
/// let blocks = stream.read_only_block_stream().expect("taken once");
/// let transactions = stream.read_only_tx_stream().expect("taken once");
/// let task = stream.start()?;
/// ```
pub struct TxStreamService {
    feed: TransactionFeed,
    token: CancellationToken,
    senders: Mutex<Option<Senders>>,
    block_stream: Mutex<Option<mpsc::Receiver<Arc<BlockEvent>>>>,
    tx_stream: Mutex<Option<mpsc::Receiver<Arc<TransactionEvent>>>>,
    last_block: TimeTracker,
    last_tx: TimeTracker,
}

impl TxStreamService {
    /// Output channels reuse the feed's channel capacities.
    pub fn new(feed: TransactionFeed, token: CancellationToken) -> Self {
        let (block_tx, block_rx) = mpsc::channel(feed.config().block_channel_capacity.max(1));
        let (tx_tx, tx_rx) = mpsc::channel(feed.config().tx_channel_capacity.max(1));
        Self {
            feed,
            token,
            senders: Mutex::new(Some((block_tx, tx_tx))),
            block_stream: Mutex::new(Some(block_rx)),
            tx_stream: Mutex::new(Some(tx_rx)),
            last_block: TimeTracker::new(),
            last_tx: TimeTracker::new(),
        }
    }

    /// Takes the block channel; `None` after the first call.
    pub fn read_only_block_stream(&self) -> Option<mpsc::Receiver<Arc<BlockEvent>>> {
        self.block_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Takes the transaction channel; `None` after the first call.
    pub fn read_only_tx_stream(&self) -> Option<mpsc::Receiver<Arc<TransactionEvent>>> {
        self.tx_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Spawns the feed. The task resolves when the feed stops; cancellation
    /// and the end of a block range count as success.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::AlreadyStarted`] on a second call.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<Result<(), FeedError>>, FeedError> {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(FeedError::AlreadyStarted)?;
        Ok(tokio::spawn(Arc::clone(self).run(senders)))
    }

    async fn run(self: Arc<Self>, (blocks, transactions): Senders) -> Result<(), FeedError> {
        let block_handler = {
            let service = Arc::clone(&self);
            handler_fn(move |event: Arc<BlockEvent>| {
                let service = Arc::clone(&service);
                let blocks = blocks.clone();
                async move {
                    forward(&service.token, &blocks, event, "block stream").await?;
                    service.last_block.set();
                    Ok(())
                }
            })
        };
        let tx_handler = {
            let service = Arc::clone(&self);
            handler_fn(move |event: Arc<TransactionEvent>| {
                let service = Arc::clone(&service);
                let transactions = transactions.clone();
                async move {
                    forward(&service.token, &transactions, event, "tx stream").await?;
                    service.last_tx.set();
                    Ok(())
                }
            })
        };

        // The handlers own the senders; the outputs close once the feed returns.
        match self
            .feed
            .for_each_transaction(Some(block_handler), tx_handler)
            .await
        {
            Ok(()) => {
                info!("Tx stream finished");
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                info!("Tx stream stopped");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Tx feed failed");
                Err(err)
            }
        }
    }
}

impl Reporter for TxStreamService {
    fn name(&self) -> &str {
        "tx-stream"
    }

    fn health(&self) -> Reports {
        vec![
            self.last_block.report("event.block.time"),
            self.last_tx.report("event.transaction.time"),
        ]
    }
}
