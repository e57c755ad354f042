// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Analyzer services: feed events to bots and turn their findings into
//! alerts.
//!
//! Each service runs two "gears":
//!
//! 1. **Input**: converts upstream events into evaluation requests and hands
//!    them to the [`RequestSender`].
//! 2. **Output**: consumes bot results, builds one [`Alert`] per finding and
//!    hands it to the [`AlertSender`], then publishes bot metrics.
//!
//! Conversion failures skip the item. An [`AlertSender`] failure stops the
//! output gear with [`AnalyzerError::Delivery`], which the supervisor sees
//! through [`AnalyzerHandle::wait`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::alerts::{truncate_finding, AddressBloomFilter, BotIdentity};
use crate::config::constants::ALERT_TIME_FORMAT;
use crate::errors::AnalyzerError;
use crate::messaging::MessageClient;
use crate::types::alert::{AgentInfo, Alert, AlertType, Finding};
use crate::types::block::TrackingTimestamps;
use crate::types::message::{
    EvaluateAlertRequest, EvaluateBlockRequest, EvaluateResponse, EvaluateTxRequest,
};

use self::metrics::AgentMetricList;

pub mod block;
pub mod combiner;
pub mod metrics;
pub mod tx;

pub use block::{BlockAnalyzerConfig, BlockAnalyzerService};
pub use combiner::{CombinerAlertAnalyzerConfig, CombinerAlertAnalyzerService};
pub use tx::{TxAnalyzerConfig, TxAnalyzerService};

/// Error type returned by external senders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A bot as deployed on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfig {
    pub id: String,
    pub image: String,
    pub image_hash: String,
    pub manifest: String,
    pub owner: String,
    pub shard_id: Option<u32>,
}

impl AgentConfig {
    pub fn to_agent_info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.clone(),
            image: self.image.clone(),
            image_hash: self.image_hash.clone(),
            manifest: self.manifest.clone(),
        }
    }

    pub fn identity(&self) -> BotIdentity<'_> {
        BotIdentity {
            bot_id: &self.id,
            bot_image: &self.image,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluateRequest {
    Tx(EvaluateTxRequest),
    Block(EvaluateBlockRequest),
    Alert(EvaluateAlertRequest),
}

/// A bot's request and response, passed along with every alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRoundTrip {
    pub agent: AgentConfig,
    pub request: EvaluateRequest,
    pub response: EvaluateResponse,
}

#[derive(Debug, Clone)]
pub struct TxResult {
    pub agent: AgentConfig,
    pub request: EvaluateTxRequest,
    pub response: EvaluateResponse,
    pub timestamps: TrackingTimestamps,
}

#[derive(Debug, Clone)]
pub struct BlockResult {
    pub agent: AgentConfig,
    pub request: EvaluateBlockRequest,
    pub response: EvaluateResponse,
    pub timestamps: TrackingTimestamps,
}

#[derive(Debug, Clone)]
pub struct CombinationResult {
    pub agent: AgentConfig,
    pub request: EvaluateAlertRequest,
    pub response: EvaluateResponse,
    pub timestamps: TrackingTimestamps,
}

/// Result channels filled by the bot pool.
#[derive(Debug)]
pub struct BotResults {
    pub tx: mpsc::Receiver<TxResult>,
    pub block: mpsc::Receiver<BlockResult>,
    pub combination: mpsc::Receiver<CombinationResult>,
}

/// Dispatches evaluation requests to bots. Results come back on
/// [`BotResults`].
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send_evaluate_tx_request(&self, request: EvaluateTxRequest);
    async fn send_evaluate_block_request(&self, request: EvaluateBlockRequest);
    async fn send_evaluate_alert_request(&self, request: EvaluateAlertRequest);
}

/// Signs and forwards alerts, e.g. to a publisher node.
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn sign_alert_and_notify(
        &self,
        round_trip: &AgentRoundTrip,
        alert: Alert,
        chain_id: &str,
        block_number: &str,
        timestamps: &TrackingTimestamps,
    ) -> Result<(), BoxError>;

    /// Records that a bot answered without findings.
    async fn notify_without_alert(
        &self,
        round_trip: &AgentRoundTrip,
        timestamps: &TrackingTimestamps,
    ) -> Result<(), BoxError>;
}

/// Running gears of one analyzer service.
#[derive(Debug)]
pub struct AnalyzerHandle {
    name: &'static str,
    tasks: JoinSet<Result<(), AnalyzerError>>,
}

impl AnalyzerHandle {
    fn new(name: &'static str, tasks: JoinSet<Result<(), AnalyzerError>>) -> Self {
        Self { name, tasks }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits until both gears stop. The first failure aborts the other gear
    /// and is returned.
    pub async fn wait(mut self) -> Result<(), AnalyzerError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined.map_err(AnalyzerError::from).and_then(|outcome| outcome) {
                error!(analyzer = self.name, error = %err, "Analyzer stopped");
                self.tasks.abort_all();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stops both gears without waiting.
    pub fn abort(&mut self) {
        self.tasks.abort_all();
    }
}

/// Feeds every item of `input` to `step` until the channel closes or the
/// token is cancelled. A failing step stops the gear.
async fn run_gear<T, F, Fut>(
    token: &CancellationToken,
    input: &mut mpsc::Receiver<T>,
    mut step: F,
) -> Result<(), AnalyzerError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), AnalyzerError>>,
{
    loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            item = input.recv() => item,
        };
        let Some(item) = item else {
            return Ok(());
        };
        step(item).await?;
    }
}

/// Per-finding alert fields that differ between analyzers.
struct AlertDraft {
    id: String,
    alert_type: AlertType,
    tags: BTreeMap<String, String>,
    bloom: AddressBloomFilter,
}

fn base_tags(agent: &AgentConfig, chain_id: u64) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("agentImage".to_string(), agent.image.clone()),
        ("agentId".to_string(), agent.id.clone()),
        ("chainId".to_string(), chain_id.to_string()),
    ])
}

fn is_private(finding: &Finding, response: &EvaluateResponse) -> bool {
    finding.private || response.private
}

fn parse_hex_u64(what: &str, value: &str) -> Result<u64, AnalyzerError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| AnalyzerError::transform(what, format!("invalid hex {value:?}: {e}")))
}

/// Truncates the finding and wraps it into an alert.
fn assemble_alert(
    draft: AlertDraft,
    mut finding: Finding,
    agent: &AgentConfig,
    created: DateTime<Utc>,
    timestamps: &TrackingTimestamps,
) -> Alert {
    let truncated = truncate_finding(&mut finding);
    Alert {
        id: draft.id,
        finding,
        timestamp: created.format(ALERT_TIME_FORMAT).to_string(),
        alert_type: draft.alert_type,
        agent: agent.to_agent_info(),
        tags: draft.tags,
        address_bloom_filter: Some(draft.bloom.to_message()),
        truncated,
        timestamps: timestamps.clone(),
    }
}

/// Hands every finding of one result to the alert sender.
///
/// `to_alert` failures skip the finding; sender failures are returned.
async fn notify_findings<F>(
    alert_sender: &dyn AlertSender,
    round_trip: &AgentRoundTrip,
    chain_id: &str,
    block_number: &str,
    timestamps: &TrackingTimestamps,
    mut to_alert: F,
) -> Result<(), AnalyzerError>
where
    F: FnMut(&Finding) -> Result<Alert, AnalyzerError>,
{
    let findings = &round_trip.response.findings;
    if findings.is_empty() {
        alert_sender
            .notify_without_alert(round_trip, timestamps)
            .await
            .map_err(|e| AnalyzerError::delivery(format!("empty result of bot {}", round_trip.agent.id), e))?;
    }

    for finding in findings {
        let alert = match to_alert(finding) {
            Ok(alert) => alert,
            Err(err) => {
                error!(error = %err, alert_id = %finding.alert_id, "Failed to transform finding to alert");
                continue;
            }
        };
        let alert_id = alert.id.clone();
        alert_sender
            .sign_alert_and_notify(round_trip, alert, chain_id, block_number, timestamps)
            .await
            .map_err(|e| AnalyzerError::delivery(format!("alert {alert_id}"), e))?;
    }
    Ok(())
}

async fn publish_metrics(msg_client: &Arc<dyn MessageClient>, metrics: AgentMetricList) {
    if let Err(err) = msg_client.publish_metrics(metrics).await {
        warn!(error = %err, "Failed to publish bot metrics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantities_parse_with_or_without_prefix() {
        assert_eq!(parse_hex_u64("block", "0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("block", "ff").unwrap(), 255);
        assert!(matches!(
            parse_hex_u64("block", "0xzz"),
            Err(AnalyzerError::Transform { .. })
        ));
    }

    #[test]
    fn base_tags_use_decimal_chain_id() {
        let agent = AgentConfig {
            id: "0xbot".to_string(),
            image: "img".to_string(),
            ..Default::default()
        };
        let tags = base_tags(&agent, 137);
        assert_eq!(tags["chainId"], "137");
        assert_eq!(tags["agentId"], "0xbot");
        assert_eq!(tags["agentImage"], "img");
    }
}
