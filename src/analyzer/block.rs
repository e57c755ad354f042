// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Block analyzer: block events in, block alerts out.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};
use uuid::Uuid;

use super::{
    assemble_alert, base_tags, is_private, metrics, notify_findings, parse_hex_u64,
    publish_metrics, run_gear, AgentConfig, AgentRoundTrip, AlertDraft, AlertSender,
    AnalyzerHandle, BlockResult, EvaluateRequest, RequestSender,
};
use crate::alerts::{alerthash, AddressBloomFilter};
use crate::errors::AnalyzerError;
use crate::health::{Reporter, Reports, TimeTracker};
use crate::messaging::MessageClient;
use crate::tracing::spans;
use crate::types::alert::{Alert, AlertType, Finding};
use crate::types::block::{BlockEvent, TrackingTimestamps};
use crate::types::message::{BlockEventMessage, EvaluateBlockRequest, EvaluateResponse};

pub struct BlockAnalyzerConfig {
    pub blocks: mpsc::Receiver<Arc<BlockEvent>>,
    pub results: mpsc::Receiver<BlockResult>,
    pub request_sender: Arc<dyn RequestSender>,
    pub alert_sender: Arc<dyn AlertSender>,
    pub msg_client: Arc<dyn MessageClient>,
}

type Inputs = (mpsc::Receiver<Arc<BlockEvent>>, mpsc::Receiver<BlockResult>);

/// Sends every block to the bots and publishes their alerts.
pub struct BlockAnalyzerService {
    inputs: Mutex<Option<Inputs>>,
    request_sender: Arc<dyn RequestSender>,
    alert_sender: Arc<dyn AlertSender>,
    msg_client: Arc<dyn MessageClient>,
    token: CancellationToken,
    last_input: TimeTracker,
    last_output: TimeTracker,
}

impl BlockAnalyzerService {
    pub fn new(config: BlockAnalyzerConfig, token: CancellationToken) -> Self {
        Self {
            inputs: Mutex::new(Some((config.blocks, config.results))),
            request_sender: config.request_sender,
            alert_sender: config.alert_sender,
            msg_client: config.msg_client,
            token,
            last_input: TimeTracker::new(),
            last_output: TimeTracker::new(),
        }
    }

    pub fn start(self: &Arc<Self>) -> Result<AnalyzerHandle, AnalyzerError> {
        let (blocks, results) = self
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(AnalyzerError::AlreadyStarted)?;

        let mut tasks = JoinSet::new();
        tasks.spawn(Arc::clone(self).run_output(results));
        tasks.spawn(Arc::clone(self).run_input(blocks));
        info!("Block analyzer started");
        Ok(AnalyzerHandle::new("block-analyzer", tasks))
    }

    async fn run_input(
        self: Arc<Self>,
        mut blocks: mpsc::Receiver<Arc<BlockEvent>>,
    ) -> Result<(), AnalyzerError> {
        run_gear(&self.token, &mut blocks, |event| self.dispatch(event)).await
    }

    async fn dispatch(&self, event: Arc<BlockEvent>) -> Result<(), AnalyzerError> {
        let request = EvaluateBlockRequest {
            request_id: Uuid::new_v4().to_string(),
            event: event.to_message(),
        };
        self.request_sender.send_evaluate_block_request(request).await;
        self.last_input.set();
        Ok(())
    }

    async fn run_output(
        self: Arc<Self>,
        mut results: mpsc::Receiver<BlockResult>,
    ) -> Result<(), AnalyzerError> {
        run_gear(&self.token, &mut results, |result| {
            let span =
                spans::process_bot_result("block", &result.agent.id, &result.request.request_id);
            self.process(result).instrument(span)
        })
        .await
    }

    async fn process(&self, result: BlockResult) -> Result<(), AnalyzerError> {
        let created = Utc::now();
        let BlockResult {
            agent,
            request,
            response,
            timestamps,
        } = result;
        let metrics = metrics::block_metrics(&agent, &response, &timestamps);
        let event = request.event.clone();
        let round_trip = AgentRoundTrip {
            agent,
            request: EvaluateRequest::Block(request),
            response,
        };

        notify_findings(
            &*self.alert_sender,
            &round_trip,
            &event.network.chain_id,
            &event.block_number,
            &timestamps,
            |finding| {
                finding_to_alert(
                    &round_trip.agent,
                    &event,
                    &round_trip.response,
                    finding,
                    created,
                    &timestamps,
                )
            },
        )
        .await?;

        publish_metrics(&self.msg_client, metrics).await;
        self.last_output.set();
        Ok(())
    }
}

fn finding_to_alert(
    agent: &AgentConfig,
    event: &BlockEventMessage,
    response: &EvaluateResponse,
    finding: &Finding,
    created: DateTime<Utc>,
    timestamps: &TrackingTimestamps,
) -> Result<Alert, AnalyzerError> {
    let id = alerthash::for_block_alert(event, finding, agent.identity());
    let block_number = parse_hex_u64("block number", &event.block_number)?;
    let chain_id = parse_hex_u64("chain id", &event.network.chain_id)?;

    let mut tags = base_tags(agent, chain_id);
    let alert_type = if is_private(finding, response) {
        AlertType::Private
    } else {
        tags.insert("blockHash".to_string(), event.block_hash.clone());
        tags.insert("blockNumber".to_string(), block_number.to_string());
        AlertType::Block
    };

    let draft = AlertDraft {
        id,
        alert_type,
        tags,
        bloom: AddressBloomFilter::for_finding(finding),
    };
    Ok(assemble_alert(draft, finding.clone(), agent, created, timestamps))
}

impl Reporter for BlockAnalyzerService {
    fn name(&self) -> &str {
        "block-analyzer"
    }

    fn health(&self) -> Reports {
        vec![
            self.last_input.report("event.input.time"),
            self.last_output.report("event.output.time"),
        ]
    }
}
