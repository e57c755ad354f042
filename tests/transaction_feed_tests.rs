// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the deduplicating transaction feed and the tx stream
//! service built on top of it.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alertscan::config::TransactionFeedConfig;
use alertscan::feeds::blocks::BlockFeed;
use alertscan::feeds::handler_fn;
use alertscan::feeds::transactions::TransactionFeed;
use alertscan::health::Status;
use alertscan::{
    BlockEvent, FeedError, Reporter, RetryConfig, ScannerConfig, TrackingTimestamps,
    TransactionEvent, TxStreamService,
};
use alloy_primitives::B256;
use chrono::Utc;
use helpers::{block, block_at, block_event, hash, transaction, MockBlockSource, MockChain};
use tokio_util::sync::CancellationToken;

fn feed_config() -> TransactionFeedConfig {
    ScannerConfig::minimal().transaction_feed
}

/// Transactions `seeds` in one block.
fn block_with(number: u64, seeds: &[u64]) -> Arc<BlockEvent> {
    block_event(number, seeds.iter().copied().map(transaction).collect())
}

fn collecting_handler() -> (alertscan::Handler<TransactionEvent>, Arc<Mutex<Vec<B256>>>) {
    let seen: Arc<Mutex<Vec<B256>>> = Arc::default();
    let recorded = Arc::clone(&seen);
    let handler = handler_fn(move |event: Arc<TransactionEvent>| {
        let recorded = Arc::clone(&recorded);
        async move {
            recorded.lock().unwrap().push(event.transaction.hash);
            Ok(())
        }
    });
    (handler, seen)
}

/// Every transaction is delivered once, in block order, with one worker
#[tokio::test]
async fn test_splits_blocks_into_ordered_unique_transactions() {
    helpers::init_tracing();
    let source = MockBlockSource::new(vec![
        block_with(1, &[1, 2, 3]),
        block_with(2, &[4, 5, 6, 6]),
        block_with(3, &[]),
        block_with(4, &[7, 8, 9]),
    ]);
    let feed = TransactionFeed::new(Arc::new(source), feed_config(), CancellationToken::new())
        .unwrap();
    let (handler, seen) = collecting_handler();

    let result = feed.for_each_transaction(None, handler).await;

    assert!(result.is_ok(), "end of blocks is a normal stop: {result:?}");
    let expected: Vec<B256> = (1..=9).map(hash).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(feed.seen_transactions(), 9);
}

/// A transaction seen in an earlier block is not delivered again
#[tokio::test]
async fn test_deduplicates_across_blocks() {
    let source = MockBlockSource::new(vec![block_with(1, &[1, 2]), block_with(2, &[2, 3])]);
    let feed = TransactionFeed::new(Arc::new(source), feed_config(), CancellationToken::new())
        .unwrap();
    let (handler, seen) = collecting_handler();

    feed.for_each_transaction(None, handler).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![hash(1), hash(2), hash(3)]);
}

/// The block handler sees every block, including empty ones
#[tokio::test]
async fn test_block_handler_sees_every_block() {
    let source = MockBlockSource::new(vec![block_with(1, &[1]), block_with(2, &[]), block_with(3, &[2])]);
    let feed = TransactionFeed::new(Arc::new(source), feed_config(), CancellationToken::new())
        .unwrap();
    let blocks: Arc<Mutex<Vec<u64>>> = Arc::default();
    let block_handler = {
        let blocks = Arc::clone(&blocks);
        handler_fn(move |event: Arc<BlockEvent>| {
            let blocks = Arc::clone(&blocks);
            async move {
                blocks.lock().unwrap().push(event.block.number);
                Ok(())
            }
        })
    };
    let (handler, _) = collecting_handler();

    feed.for_each_transaction(Some(block_handler), handler)
        .await
        .unwrap();

    assert_eq!(*blocks.lock().unwrap(), vec![1, 2, 3]);
}

/// Blocks older than the configured age are dropped before splitting
#[tokio::test]
async fn test_drops_stale_blocks() {
    let stale = Arc::new(BlockEvent {
        chain_id: 1,
        block: block_at(1, Utc::now() - chrono::Duration::hours(2), vec![transaction(1)]),
        logs: Vec::new(),
        traces: Vec::new(),
        timestamps: TrackingTimestamps::default(),
    });
    let source = MockBlockSource::new(vec![stale, block_with(2, &[2])]);
    let mut config = feed_config();
    config.max_block_age = Some(Duration::from_secs(60 * 60));
    let feed = TransactionFeed::new(Arc::new(source), config, CancellationToken::new()).unwrap();
    let (handler, seen) = collecting_handler();

    feed.for_each_transaction(None, handler).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![hash(2)]);
}

/// A failing transaction handler stops the feed with its error
#[tokio::test]
async fn test_handler_error_is_returned() {
    let source = MockBlockSource::new(vec![block_with(1, &[1, 2, 3])]);
    let feed = TransactionFeed::new(Arc::new(source), feed_config(), CancellationToken::new())
        .unwrap();
    let handler = handler_fn(|_event: Arc<TransactionEvent>| async move {
        Err(FeedError::handler_message("bot pool unavailable"))
    });

    let err = feed.for_each_transaction(None, handler).await.unwrap_err();

    assert!(matches!(err, FeedError::Handler(_)));
}

/// A failing worker stops the block source instead of leaving it running
#[tokio::test]
async fn test_worker_failure_stops_the_block_source() {
    let source = Arc::new(
        MockBlockSource::new(vec![block_with(1, &[1])]).held_open(CancellationToken::new()),
    );
    let feed = TransactionFeed::new(source.clone(), feed_config(), CancellationToken::new())
        .unwrap();
    let handler = handler_fn(|_event: Arc<TransactionEvent>| async move {
        Err(FeedError::handler_message("bot pool unavailable"))
    });

    let err = tokio::time::timeout(Duration::from_secs(5), feed.for_each_transaction(None, handler))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, FeedError::Handler(_)), "got {err:?}");
    assert!(source.was_stopped());
}

/// After a worker error the block feed underneath stops polling the chain
#[tokio::test]
async fn test_worker_failure_stops_block_fetching() {
    let chain = Arc::new(MockChain::new());
    let mut config = ScannerConfig::minimal().block_feed;
    config.start = Some(1);
    config.poll_interval = Duration::from_millis(20);
    config.retry = RetryConfig::fast();
    let block_feed = Arc::new(BlockFeed::new(
        1,
        chain.clone(),
        config,
        CancellationToken::new(),
    ));
    let feed = TransactionFeed::new(block_feed.clone(), feed_config(), CancellationToken::new())
        .unwrap();
    let handler = handler_fn(|_event: Arc<TransactionEvent>| async move {
        Err(FeedError::handler_message("bot pool unavailable"))
    });

    block_feed.start();
    // The block appears only once the transaction feed has subscribed.
    let produce = {
        let chain = Arc::clone(&chain);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            chain.add_block(block(1, vec![transaction(1)]));
        }
    };
    let (result, ()) = tokio::join!(feed.for_each_transaction(None, handler), produce);
    assert!(matches!(result, Err(FeedError::Handler(_))), "got {result:?}");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let before = chain.requested().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        chain.requested().len(),
        before,
        "the block feed kept fetching after the transaction feed failed"
    );
}

/// Cancelling the parent token stops an open-ended feed
#[tokio::test]
async fn test_cancellation_stops_the_feed() {
    let token = CancellationToken::new();
    let source = MockBlockSource::new(vec![block_with(1, &[1])]).held_open(token.clone());
    let feed = TransactionFeed::new(Arc::new(source), feed_config(), token.clone()).unwrap();
    let (handler, seen) = collecting_handler();

    let cancel = {
        let seen = Arc::clone(&seen);
        async move {
            helpers::eventually("first transaction", || !seen.lock().unwrap().is_empty()).await;
            token.cancel();
        }
    };
    let (result, ()) = tokio::join!(feed.for_each_transaction(None, handler), cancel);

    assert!(result.unwrap_err().is_cancelled());
}

/// The tx stream forwards blocks and transactions and closes both channels
/// when the feed ends
#[tokio::test]
async fn test_tx_stream_forwards_and_closes() {
    let source = MockBlockSource::new(vec![block_with(1, &[1, 2]), block_with(2, &[3])]);
    let token = CancellationToken::new();
    let feed = TransactionFeed::new(Arc::new(source), feed_config(), token.child_token()).unwrap();
    let stream = Arc::new(TxStreamService::new(feed, token.child_token()));

    let mut blocks = stream.read_only_block_stream().unwrap();
    let mut transactions = stream.read_only_tx_stream().unwrap();
    assert!(stream.read_only_tx_stream().is_none(), "streams are taken once");

    let task = stream.start().unwrap();
    assert!(matches!(stream.start(), Err(FeedError::AlreadyStarted)));

    let mut block_numbers = Vec::new();
    while let Some(block) = blocks.recv().await {
        block_numbers.push(block.block.number);
    }
    let mut hashes = Vec::new();
    while let Some(tx) = transactions.recv().await {
        hashes.push(tx.transaction.hash);
    }

    assert_eq!(block_numbers, vec![1, 2]);
    assert_eq!(hashes, vec![hash(1), hash(2), hash(3)]);
    task.await.unwrap().unwrap();

    let reports = stream.health();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.status == Status::Ok));
}
