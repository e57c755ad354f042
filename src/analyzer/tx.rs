// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Transaction analyzer: transaction events in, transaction alerts out.

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
    AnalyzerHandle, EvaluateRequest, RequestSender, TxResult,
};
use crate::alerts::{alerthash, AddressBloomFilter};
use crate::errors::AnalyzerError;
use crate::health::{Reporter, Reports, TimeTracker};
use crate::messaging::MessageClient;
use crate::tracing::spans;
use crate::types::alert::{Alert, AlertType, Finding};
use crate::types::block::{TrackingTimestamps, TransactionEvent};
use crate::types::message::{EvaluateResponse, EvaluateTxRequest, TransactionEventMessage};

pub struct TxAnalyzerConfig {
    pub transactions: mpsc::Receiver<Arc<TransactionEvent>>,
    pub results: mpsc::Receiver<TxResult>,
    pub request_sender: Arc<dyn RequestSender>,
    pub alert_sender: Arc<dyn AlertSender>,
    pub msg_client: Arc<dyn MessageClient>,
}

type Inputs = (
    mpsc::Receiver<Arc<TransactionEvent>>,
    mpsc::Receiver<TxResult>,
);

/// Sends every transaction to the bots and publishes their alerts.
pub struct TxAnalyzerService {
    inputs: Mutex<Option<Inputs>>,
    request_sender: Arc<dyn RequestSender>,
    alert_sender: Arc<dyn AlertSender>,
    msg_client: Arc<dyn MessageClient>,
    token: CancellationToken,
    last_input: TimeTracker,
    last_output: TimeTracker,
}

impl TxAnalyzerService {
    pub fn new(config: TxAnalyzerConfig, token: CancellationToken) -> Self {
        Self {
            inputs: Mutex::new(Some((config.transactions, config.results))),
            request_sender: config.request_sender,
            alert_sender: config.alert_sender,
            msg_client: config.msg_client,
            token,
            last_input: TimeTracker::new(),
            last_output: TimeTracker::new(),
        }
    }

    /// Spawns both gears.
    pub fn start(self: &Arc<Self>) -> Result<AnalyzerHandle, AnalyzerError> {
        let (transactions, results) = self
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(AnalyzerError::AlreadyStarted)?;

        let mut tasks = JoinSet::new();
        tasks.spawn(Arc::clone(self).run_output(results));
        tasks.spawn(Arc::clone(self).run_input(transactions));
        info!("Tx analyzer started");
        Ok(AnalyzerHandle::new("tx-analyzer", tasks))
    }

    async fn run_input(
        self: Arc<Self>,
        mut transactions: mpsc::Receiver<Arc<TransactionEvent>>,
    ) -> Result<(), AnalyzerError> {
        run_gear(&self.token, &mut transactions, |event| self.dispatch(event)).await
    }

    async fn dispatch(&self, event: Arc<TransactionEvent>) -> Result<(), AnalyzerError> {
        let request = EvaluateTxRequest {
            request_id: Uuid::new_v4().to_string(),
            event: event.to_message(),
        };
        self.request_sender.send_evaluate_tx_request(request).await;
        self.last_input.set();
        Ok(())
    }

    async fn run_output(
        self: Arc<Self>,
        mut results: mpsc::Receiver<TxResult>,
    ) -> Result<(), AnalyzerError> {
        run_gear(&self.token, &mut results, |result| {
            let span = spans::process_bot_result("tx", &result.agent.id, &result.request.request_id);
            self.process(result).instrument(span)
        })
        .await
    }

    async fn process(&self, result: TxResult) -> Result<(), AnalyzerError> {
        let created = Utc::now();
        let TxResult {
            agent,
            request,
            response,
            timestamps,
        } = result;
        let metrics = metrics::tx_metrics(&agent, &response, &timestamps);
        let event = request.event.clone();
        let round_trip = AgentRoundTrip {
            agent,
            request: EvaluateRequest::Tx(request),
            response,
        };

        notify_findings(
            &*self.alert_sender,
            &round_trip,
            &event.network.chain_id,
            &event.block.block_number,
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
    event: &TransactionEventMessage,
    response: &EvaluateResponse,
    finding: &Finding,
    created: DateTime<Utc>,
    timestamps: &TrackingTimestamps,
) -> Result<Alert, AnalyzerError> {
    let id = alerthash::for_transaction_alert(event, finding, agent.identity());
    let block_number = parse_hex_u64("block number", &event.block.block_number)?;
    let chain_id = parse_hex_u64("chain id", &event.network.chain_id)?;

    let mut tags = base_tags(agent, chain_id);
    let alert_type = if is_private(finding, response) {
        AlertType::Private
    } else {
        tags.insert("txHash".to_string(), event.transaction.hash.clone());
        tags.insert("blockHash".to_string(), event.block.block_hash.clone());
        tags.insert("blockNumber".to_string(), block_number.to_string());
        AlertType::Transaction
    };

    let draft = AlertDraft {
        id,
        alert_type,
        tags,
        bloom: AddressBloomFilter::for_transaction_finding(finding, event),
    };
    Ok(assemble_alert(draft, finding.clone(), agent, created, timestamps))
}

impl Reporter for TxAnalyzerService {
    fn name(&self) -> &str {
        "tx-analyzer"
    }

    fn health(&self) -> Reports {
        vec![
            self.last_input.report("event.input.time"),
            self.last_output.report("event.output.time"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::{BlockInfoMessage, NetworkMessage, TransactionMessage};

    fn event() -> TransactionEventMessage {
        TransactionEventMessage {
            transaction: TransactionMessage {
                hash: "0xtx".to_string(),
                from: "0x01".to_string(),
                to: Some("0x02".to_string()),
                nonce: "0x0".to_string(),
                value: "0x0".to_string(),
                gas: "0x0".to_string(),
                gas_price: None,
                input: "0x".to_string(),
            },
            network: NetworkMessage::new(137),
            block: BlockInfoMessage {
                block_hash: "0xblock".to_string(),
                block_number: "0x2a".to_string(),
                block_timestamp: "0x0".to_string(),
            },
            logs: Vec::new(),
            traces: Vec::new(),
            addresses: ["0x01".to_string(), "0x02".to_string()].into(),
            timestamps: TrackingTimestamps::default(),
        }
    }

    fn agent() -> AgentConfig {
        AgentConfig {
            id: "0xbot".to_string(),
            image: "img".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn public_alert_carries_transaction_tags() {
        let finding = Finding {
            addresses: vec!["0xff".to_string()],
            ..Default::default()
        };
        let alert = finding_to_alert(
            &agent(),
            &event(),
            &EvaluateResponse::default(),
            &finding,
            Utc::now(),
            &TrackingTimestamps::default(),
        )
        .unwrap();

        assert_eq!(alert.alert_type, AlertType::Transaction);
        assert_eq!(alert.tags["chainId"], "137");
        assert_eq!(alert.tags["blockNumber"], "42");
        assert_eq!(alert.tags["txHash"], "0xtx");

        let bloom = AddressBloomFilter::from_message(alert.address_bloom_filter.as_ref().unwrap())
            .unwrap();
        assert!(bloom.contains("0xff"));
        assert!(bloom.contains("0x02"));
    }

    #[test]
    fn private_response_hides_transaction_tags() {
        let response = EvaluateResponse {
            private: true,
            ..Default::default()
        };
        let alert = finding_to_alert(
            &agent(),
            &event(),
            &response,
            &Finding::default(),
            Utc::now(),
            &TrackingTimestamps::default(),
        )
        .unwrap();
        assert_eq!(alert.alert_type, AlertType::Private);
        assert!(!alert.tags.contains_key("txHash"));
        assert_eq!(alert.tags.len(), 3);
    }

    #[test]
    fn bad_block_number_is_a_transform_error() {
        let mut event = event();
        event.block.block_number = "forty-two".to_string();
        let err = finding_to_alert(
            &agent(),
            &event,
            &EvaluateResponse::default(),
            &Finding::default(),
            Utc::now(),
            &TrackingTimestamps::default(),
        )
        .unwrap_err();
        assert!(!err.is_fatal());
    }
}
