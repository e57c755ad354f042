// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Test helpers for alertscan integration tests
//!
//! Provides scripted chains, block sources and recording collaborators so the
//! pipeline can be exercised without a node, a bot pool or a publisher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alertscan::analyzer::{AgentRoundTrip, AlertSender, BoxError, RequestSender};
use alertscan::chain::{ChainSource, Head};
use alertscan::feeds::alerts::AlertSource;
use alertscan::feeds::{BlockSource, Handler};
use alertscan::messaging::MessageClient;
use alertscan::types::alert::Alert;
use alertscan::types::block::{Block, BlockEvent, Trace, TrackingTimestamps, Transaction};
use alertscan::types::combiner::{
    AlertSourceInfo, BotInfo, BotSubscription, CombinerBotSubscription, SourceBlock, SourceBot,
    UpstreamAlert,
};
use alertscan::types::message::{EvaluateAlertRequest, EvaluateBlockRequest, EvaluateTxRequest};
use alertscan::{FeedError, MessagingError, RpcError};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::{Filter, Log};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic 32-byte hash for `seed`.
pub fn hash(seed: u64) -> B256 {
    B256::left_padding_from(&seed.to_be_bytes())
}

pub fn address(seed: u8) -> Address {
    Address::with_last_byte(seed)
}

/// A plain value transfer with a hash derived from `seed`.
pub fn transaction(seed: u64) -> Transaction {
    Transaction {
        hash: hash(seed),
        from: address(1),
        to: Some(address(2)),
        nonce: seed,
        value: U256::from(1u64),
        gas: 21_000,
        gas_price: Some(1_000_000_000),
        input: Bytes::new(),
    }
}

/// A block produced just now.
pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    block_at(number, Utc::now(), transactions)
}

pub fn block_at(number: u64, time: DateTime<Utc>, transactions: Vec<Transaction>) -> Block {
    Block {
        hash: hash(1_000_000 + number),
        parent_hash: hash(1_000_000 + number.saturating_sub(1)),
        number,
        timestamp: u64::try_from(time.timestamp()).unwrap_or_default(),
        base_fee_per_gas: Some(7),
        transactions,
    }
}

pub fn block_event(number: u64, transactions: Vec<Transaction>) -> Arc<BlockEvent> {
    Arc::new(BlockEvent {
        chain_id: 1,
        block: block(number, transactions),
        logs: Vec::new(),
        traces: Vec::new(),
        timestamps: TrackingTimestamps {
            block: Some(Utc::now()),
            ..Default::default()
        },
    })
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Scripted [`ChainSource`].
///
/// Blocks that were not added do not exist yet. Failures can be scheduled per
/// block number and heads announced through a subscription stream.
pub struct MockChain {
    blocks: Mutex<HashMap<u64, Block>>,
    head: AtomicU64,
    failures: Mutex<HashMap<u64, u32>>,
    trace_failures: Mutex<HashMap<u64, u32>>,
    requested: Mutex<Vec<u64>>,
    traced: Mutex<Vec<u64>>,
    log_filters: Mutex<Vec<Filter>>,
    head_tx: mpsc::UnboundedSender<Head>,
    head_rx: Mutex<Option<mpsc::UnboundedReceiver<Head>>>,
}

impl MockChain {
    pub fn new() -> Self {
        let (head_tx, head_rx) = mpsc::unbounded_channel();
        Self {
            blocks: Mutex::new(HashMap::new()),
            head: AtomicU64::new(0),
            failures: Mutex::new(HashMap::new()),
            trace_failures: Mutex::new(HashMap::new()),
            requested: Mutex::new(Vec::new()),
            traced: Mutex::new(Vec::new()),
            log_filters: Mutex::new(Vec::new()),
            head_tx,
            head_rx: Mutex::new(Some(head_rx)),
        }
    }

    /// Adds fresh blocks `numbers` without transactions and moves the head.
    pub fn with_blocks(self, numbers: impl IntoIterator<Item = u64>) -> Self {
        for number in numbers {
            self.add_block(block(number, Vec::new()));
        }
        self
    }

    /// Adds a block; the head follows the highest block added.
    pub fn add_block(&self, block: Block) {
        self.head.fetch_max(block.number, Ordering::SeqCst);
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn set_head(&self, number: u64) {
        self.head.store(number, Ordering::SeqCst);
    }

    /// Makes the next `times` fetches of `number` fail.
    pub fn fail_block(&self, number: u64, times: u32) {
        self.failures.lock().unwrap().insert(number, times);
    }

    /// Makes the next `times` trace fetches of `number` fail.
    pub fn fail_trace(&self, number: u64, times: u32) {
        self.trace_failures.lock().unwrap().insert(number, times);
    }

    /// Publishes a new head to the subscription stream.
    pub fn announce_head(&self, number: u64) {
        self.head.fetch_max(number, Ordering::SeqCst);
        let _ = self.head_tx.send(Head {
            number,
            hash: hash(1_000_000 + number),
        });
    }

    /// Block numbers requested so far, in order.
    pub fn requested(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }

    /// Block numbers passed to `trace_block`, in order.
    pub fn traced(&self) -> Vec<u64> {
        self.traced.lock().unwrap().clone()
    }

    /// Block hashes of every log filter, in order.
    pub fn log_block_hashes(&self) -> Vec<Option<B256>> {
        self.log_filters
            .lock()
            .unwrap()
            .iter()
            .map(Filter::get_block_hash)
            .collect()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError> {
        self.requested.lock().unwrap().push(number);
        scripted_failure(&self.failures, number, "block_by_number")?;
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.log_filters.lock().unwrap().push(filter.clone());
        Ok(Vec::new())
    }

    async fn trace_block(&self, number: u64) -> Result<Vec<Trace>, RpcError> {
        self.traced.lock().unwrap().push(number);
        scripted_failure(&self.trace_failures, number, "trace_block")?;
        Ok(Vec::new())
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn subscribe_to_head(&self) -> Result<BoxStream<'static, Head>, RpcError> {
        let rx = self
            .head_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(RpcError::SubscriptionsUnsupported)?;
        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|head| (head, rx))
        })
        .boxed())
    }
}

/// Consumes one scheduled failure of `method` for `number`, if any is left.
fn scripted_failure(
    failures: &Mutex<HashMap<u64, u32>>,
    number: u64,
    method: &str,
) -> Result<(), RpcError> {
    let mut failures = failures.lock().unwrap();
    match failures.get_mut(&number) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            Err(RpcError::invalid_response(
                method,
                format!("scripted failure for block {number}"),
            ))
        }
        _ => Ok(()),
    }
}

/// [`BlockSource`] emitting a fixed list of block events.
///
/// After the last event it reports `terminal`, or waits for `hold` to be
/// cancelled and reports [`FeedError::Cancelled`].
pub struct MockBlockSource {
    events: Vec<Arc<BlockEvent>>,
    terminal: FeedError,
    hold: Option<CancellationToken>,
    stopped: CancellationToken,
}

impl MockBlockSource {
    pub fn new(events: Vec<Arc<BlockEvent>>) -> Self {
        Self {
            events,
            terminal: FeedError::EndBlockReached,
            hold: None,
            stopped: CancellationToken::new(),
        }
    }

    /// Whether a subscriber asked the source to stop.
    pub fn was_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    pub fn ending_with(mut self, terminal: FeedError) -> Self {
        self.terminal = terminal;
        self
    }

    /// Keeps the subscription open until `token` is cancelled.
    pub fn held_open(mut self, token: CancellationToken) -> Self {
        self.hold = Some(token);
        self
    }
}

impl BlockSource for MockBlockSource {
    fn subscribe(&self, handler: Handler<BlockEvent>) -> oneshot::Receiver<FeedError> {
        let (done, rx) = oneshot::channel();
        let events = self.events.clone();
        let terminal = self.terminal.clone();
        let hold = self.hold.clone();
        let stopped = self.stopped.clone();
        tokio::spawn(async move {
            for event in events {
                if let Err(err) = handler(event).await {
                    let _ = done.send(err);
                    return;
                }
            }
            if let Some(token) = hold {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = stopped.cancelled() => {}
                }
                let _ = done.send(FeedError::Cancelled);
                return;
            }
            let _ = done.send(terminal);
        });
        rx
    }

    fn stop(&self) {
        self.stopped.cancel();
    }
}

/// Records every evaluation request.
#[derive(Default)]
pub struct RecordingRequestSender {
    pub tx: Mutex<Vec<EvaluateTxRequest>>,
    pub block: Mutex<Vec<EvaluateBlockRequest>>,
    pub alert: Mutex<Vec<EvaluateAlertRequest>>,
}

#[async_trait]
impl RequestSender for RecordingRequestSender {
    async fn send_evaluate_tx_request(&self, request: EvaluateTxRequest) {
        self.tx.lock().unwrap().push(request);
    }

    async fn send_evaluate_block_request(&self, request: EvaluateBlockRequest) {
        self.block.lock().unwrap().push(request);
    }

    async fn send_evaluate_alert_request(&self, request: EvaluateAlertRequest) {
        self.alert.lock().unwrap().push(request);
    }
}

/// An alert as handed to the [`AlertSender`].
#[derive(Debug, Clone)]
pub struct SentAlert {
    pub alert: Alert,
    pub chain_id: String,
    pub block_number: String,
    pub bot_id: String,
}

/// Records alerts; fails every call once `fail` is set.
#[derive(Default)]
pub struct RecordingAlertSender {
    pub alerts: Mutex<Vec<SentAlert>>,
    /// Bot ids of results without findings
    pub empty: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingAlertSender {
    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail.store(true, Ordering::SeqCst);
        sender
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.alerts.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("publisher unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSender for RecordingAlertSender {
    async fn sign_alert_and_notify(
        &self,
        round_trip: &AgentRoundTrip,
        alert: Alert,
        chain_id: &str,
        block_number: &str,
        _timestamps: &TrackingTimestamps,
    ) -> Result<(), BoxError> {
        self.check()?;
        self.alerts.lock().unwrap().push(SentAlert {
            alert,
            chain_id: chain_id.to_string(),
            block_number: block_number.to_string(),
            bot_id: round_trip.agent.id.clone(),
        });
        Ok(())
    }

    async fn notify_without_alert(
        &self,
        round_trip: &AgentRoundTrip,
        _timestamps: &TrackingTimestamps,
    ) -> Result<(), BoxError> {
        self.check()?;
        self.empty.lock().unwrap().push(round_trip.agent.id.clone());
        Ok(())
    }
}

/// Records published payloads by subject.
#[derive(Default)]
pub struct RecordingMessageClient {
    pub published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingMessageClient {
    pub fn subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl MessageClient for RecordingMessageClient {
    async fn publish(&self, subject: &str, payload: serde_json::Value) -> Result<(), MessagingError> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }
}

/// [`AlertSource`] returning a fixed set of alerts filtered by source bot.
#[derive(Default)]
pub struct MockAlertSource {
    alerts: Mutex<Vec<UpstreamAlert>>,
    failures: AtomicU32,
    queries: AtomicUsize,
}

impl MockAlertSource {
    pub fn with_alerts(alerts: Vec<UpstreamAlert>) -> Self {
        Self {
            alerts: Mutex::new(alerts),
            ..Default::default()
        }
    }

    pub fn push(&self, alert: UpstreamAlert) {
        self.alerts.lock().unwrap().push(alert);
    }

    /// Makes the next `times` queries fail.
    pub fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertSource for MockAlertSource {
    async fn alerts_for(
        &self,
        bot_ids: &[String],
        _since: DateTime<Utc>,
    ) -> Result<Vec<UpstreamAlert>, FeedError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FeedError::query(std::io::Error::other("alert API unavailable")));
        }
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|alert| {
                alert
                    .source
                    .as_ref()
                    .is_some_and(|source| bot_ids.contains(&source.bot.id))
            })
            .cloned()
            .collect())
    }
}

/// An upstream alert raised by `source_bot` on `chain_id`.
pub fn upstream_alert(hash: &str, source_bot: &str, chain_id: u64) -> UpstreamAlert {
    UpstreamAlert {
        hash: hash.to_string(),
        alert_id: "SRC-ALERT".to_string(),
        name: "source alert".to_string(),
        addresses: vec!["0x00000000000000000000000000000000000000aa".to_string()],
        created_at: Some(Utc::now()),
        source: Some(AlertSourceInfo {
            bot: SourceBot {
                id: source_bot.to_string(),
                ..Default::default()
            },
            block: Some(SourceBlock {
                chain_id,
                number: 100,
                hash: format!("{:#x}", hash_for(hash)),
                timestamp: String::new(),
            }),
            transaction_hash: None,
        }),
        ..Default::default()
    }
}

fn hash_for(text: &str) -> B256 {
    alloy_primitives::keccak256(text.as_bytes())
}

/// `subscriber` subscribing to every alert of `source_bot`.
pub fn subscription(subscriber: &str, source_bot: &str) -> CombinerBotSubscription {
    CombinerBotSubscription {
        subscriber: BotInfo {
            bot_id: subscriber.to_string(),
            bot_owner: "0xowner".to_string(),
            bot_image: format!("{subscriber}-image"),
        },
        subscription: BotSubscription {
            bot_id: source_bot.to_string(),
            alert_ids: Vec::new(),
            chain_id: None,
        },
    }
}
