// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Combiner analyzer: upstream alerts in, combination alerts out.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use super::{
    assemble_alert, base_tags, is_private, metrics, notify_findings, publish_metrics, run_gear,
    AgentConfig, AgentRoundTrip, AlertDraft, AlertSender, AnalyzerHandle, CombinationResult,
    EvaluateRequest, RequestSender,
};
use crate::alerts::{alerthash, AddressBloomFilter};
use crate::errors::AnalyzerError;
use crate::health::{Reporter, Reports, TimeTracker};
use crate::messaging::MessageClient;
use crate::tracing::spans;
use crate::types::alert::{Alert, AlertType, Finding};
use crate::types::block::TrackingTimestamps;
use crate::types::combiner::AlertEvent;
use crate::types::message::{AlertEventMessage, EvaluateAlertRequest, EvaluateResponse};

pub struct CombinerAlertAnalyzerConfig {
    /// Chain this node scans; reported with every combination alert
    pub chain_id: u64,
    pub alerts: mpsc::Receiver<Arc<AlertEvent>>,
    pub results: mpsc::Receiver<CombinationResult>,
    pub request_sender: Arc<dyn RequestSender>,
    pub alert_sender: Arc<dyn AlertSender>,
    pub msg_client: Arc<dyn MessageClient>,
}

type Inputs = (
    mpsc::Receiver<Arc<AlertEvent>>,
    mpsc::Receiver<CombinationResult>,
);

/// Sends upstream alerts to their subscribing bots and publishes the
/// resulting combination alerts.
pub struct CombinerAlertAnalyzerService {
    chain_id: u64,
    inputs: Mutex<Option<Inputs>>,
    request_sender: Arc<dyn RequestSender>,
    alert_sender: Arc<dyn AlertSender>,
    msg_client: Arc<dyn MessageClient>,
    token: CancellationToken,
    last_input: TimeTracker,
    last_output: TimeTracker,
}

impl CombinerAlertAnalyzerService {
    pub fn new(config: CombinerAlertAnalyzerConfig, token: CancellationToken) -> Self {
        Self {
            chain_id: config.chain_id,
            inputs: Mutex::new(Some((config.alerts, config.results))),
            request_sender: config.request_sender,
            alert_sender: config.alert_sender,
            msg_client: config.msg_client,
            token,
            last_input: TimeTracker::new(),
            last_output: TimeTracker::new(),
        }
    }

    pub fn start(self: &Arc<Self>) -> Result<AnalyzerHandle, AnalyzerError> {
        let (alerts, results) = self
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(AnalyzerError::AlreadyStarted)?;

        let mut tasks = JoinSet::new();
        tasks.spawn(Arc::clone(self).run_output(results));
        tasks.spawn(Arc::clone(self).run_input(alerts));
        info!(chain_id = self.chain_id, "Combiner analyzer started");
        Ok(AnalyzerHandle::new("combiner-analyzer", tasks))
    }

    async fn run_input(
        self: Arc<Self>,
        mut alerts: mpsc::Receiver<Arc<AlertEvent>>,
    ) -> Result<(), AnalyzerError> {
        run_gear(&self.token, &mut alerts, |event| self.dispatch(event)).await
    }

    async fn dispatch(&self, event: Arc<AlertEvent>) -> Result<(), AnalyzerError> {
        let subscriber = event.subscriber.bot_id.as_str();
        debug!(subscriber, alert = %event.alert.hash, "Received alert");

        let message = match event.to_message() {
            Ok(message) => message,
            Err(err) => {
                error!(subscriber, error = %err, "Failed to convert alert event (skipping)");
                return Ok(());
            }
        };
        let request = EvaluateAlertRequest {
            request_id: Uuid::new_v4().to_string(),
            target_bot_id: subscriber.to_string(),
            event: message,
        };
        self.request_sender.send_evaluate_alert_request(request).await;
        self.last_input.set();
        Ok(())
    }

    async fn run_output(
        self: Arc<Self>,
        mut results: mpsc::Receiver<CombinationResult>,
    ) -> Result<(), AnalyzerError> {
        run_gear(&self.token, &mut results, |result| {
            let span =
                spans::process_bot_result("combiner", &result.agent.id, &result.request.request_id);
            self.process(result).instrument(span)
        })
        .await
    }

    async fn process(&self, result: CombinationResult) -> Result<(), AnalyzerError> {
        let created = Utc::now();
        let CombinationResult {
            agent,
            request,
            response,
            timestamps,
        } = result;
        let metrics = metrics::combiner_metrics(&agent, &response, &timestamps);
        let event = request.event.clone();
        let round_trip = AgentRoundTrip {
            agent,
            request: EvaluateRequest::Alert(request),
            response,
        };
        let chain_id = format!("{:#x}", self.chain_id);

        // Combination alerts are not tied to a block of this chain.
        notify_findings(
            &*self.alert_sender,
            &round_trip,
            &chain_id,
            "",
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
    event: &AlertEventMessage,
    response: &EvaluateResponse,
    finding: &Finding,
    created: DateTime<Utc>,
    timestamps: &TrackingTimestamps,
) -> Result<Alert, AnalyzerError> {
    let id = alerthash::for_combination_alert(event, finding, agent.identity());
    let source_chain = event
        .alert
        .source
        .as_ref()
        .and_then(|source| source.block.as_ref())
        .map(|block| block.chain_id)
        .ok_or_else(|| {
            AnalyzerError::transform(
                format!("alert {}", event.alert.hash),
                "source alert has no block",
            )
        })?;

    let alert_type = if is_private(finding, response) {
        AlertType::Private
    } else {
        AlertType::Combination
    };
    let draft = AlertDraft {
        id,
        alert_type,
        tags: base_tags(agent, source_chain),
        bloom: AddressBloomFilter::for_finding(finding),
    };
    Ok(assemble_alert(draft, finding.clone(), agent, created, timestamps))
}

impl Reporter for CombinerAlertAnalyzerService {
    fn name(&self) -> &str {
        "combiner-analyzer"
    }

    fn health(&self) -> Reports {
        vec![
            self.last_input.report("event.input.time"),
            self.last_output.report("event.output.time"),
        ]
    }
}
