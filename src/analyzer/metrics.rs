// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Per-result bot metrics published on the `metric.agent` subject.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::AgentConfig;
use crate::types::block::TrackingTimestamps;
use crate::types::message::EvaluateResponse;

pub const METRIC_TX_REQUEST: &str = "tx.request";
pub const METRIC_TX_LATENCY: &str = "tx.latency";
pub const METRIC_TX_FINDING: &str = "tx.finding";
pub const METRIC_BLOCK_REQUEST: &str = "block.request";
pub const METRIC_BLOCK_LATENCY: &str = "block.latency";
pub const METRIC_BLOCK_FINDING: &str = "block.finding";
pub const METRIC_COMBINER_REQUEST: &str = "combiner.request";
pub const METRIC_COMBINER_LATENCY: &str = "combiner.latency";
pub const METRIC_COMBINER_FINDING: &str = "combiner.finding";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetric {
    pub agent_id: String,
    pub timestamp: String,
    pub name: String,
    pub value: f64,
    /// `-1` when the bot is not sharded
    pub shard_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetricList {
    pub metrics: Vec<AgentMetric>,
}

struct MetricNames {
    request: &'static str,
    latency: &'static str,
    finding: &'static str,
}

const TX: MetricNames = MetricNames {
    request: METRIC_TX_REQUEST,
    latency: METRIC_TX_LATENCY,
    finding: METRIC_TX_FINDING,
};

const BLOCK: MetricNames = MetricNames {
    request: METRIC_BLOCK_REQUEST,
    latency: METRIC_BLOCK_LATENCY,
    finding: METRIC_BLOCK_FINDING,
};

const COMBINER: MetricNames = MetricNames {
    request: METRIC_COMBINER_REQUEST,
    latency: METRIC_COMBINER_LATENCY,
    finding: METRIC_COMBINER_FINDING,
};

pub fn tx_metrics(
    agent: &AgentConfig,
    response: &EvaluateResponse,
    timestamps: &TrackingTimestamps,
) -> AgentMetricList {
    build(&TX, agent, response, timestamps)
}

pub fn block_metrics(
    agent: &AgentConfig,
    response: &EvaluateResponse,
    timestamps: &TrackingTimestamps,
) -> AgentMetricList {
    build(&BLOCK, agent, response, timestamps)
}

pub fn combiner_metrics(
    agent: &AgentConfig,
    response: &EvaluateResponse,
    timestamps: &TrackingTimestamps,
) -> AgentMetricList {
    build(&COMBINER, agent, response, timestamps)
}

/// Bots that reported a latency metric, i.e. that answered at least one
/// request.
pub fn active_bots(metrics: &[AgentMetric]) -> BTreeSet<String> {
    metrics
        .iter()
        .filter(|m| {
            matches!(
                m.name.as_str(),
                METRIC_TX_LATENCY | METRIC_BLOCK_LATENCY | METRIC_COMBINER_LATENCY
            )
        })
        .map(|m| m.agent_id.clone())
        .collect()
}

fn build(
    names: &MetricNames,
    agent: &AgentConfig,
    response: &EvaluateResponse,
    timestamps: &TrackingTimestamps,
) -> AgentMetricList {
    let at = timestamps.bot_response.unwrap_or_else(Utc::now);
    let metric = |name: &str, value: f64| AgentMetric {
        agent_id: agent.id.clone(),
        timestamp: format_time(at),
        name: name.to_string(),
        value,
        shard_id: agent.shard_id.map_or(-1, i64::from),
    };

    let mut metrics = vec![
        metric(names.request, 1.0),
        metric(names.latency, f64::from(response.latency_ms)),
    ];
    if !response.findings.is_empty() {
        metrics.push(metric(names.finding, response.findings.len() as f64));
    }
    AgentMetricList { metrics }
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::alert::Finding;

    fn agent() -> AgentConfig {
        AgentConfig {
            id: "0xbot".to_string(),
            image: "image".to_string(),
            shard_id: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn findings_metric_only_when_findings_exist() {
        let empty = tx_metrics(&agent(), &EvaluateResponse::default(), &TrackingTimestamps::default());
        assert_eq!(empty.metrics.len(), 2);

        let response = EvaluateResponse {
            findings: vec![Finding::default(), Finding::default()],
            latency_ms: 12,
            ..Default::default()
        };
        let list = block_metrics(&agent(), &response, &TrackingTimestamps::default());
        let finding = list
            .metrics
            .iter()
            .find(|m| m.name == METRIC_BLOCK_FINDING)
            .unwrap();
        assert_eq!(finding.value, 2.0);
        assert_eq!(finding.shard_id, 2);
    }

    #[test]
    fn active_bots_are_those_with_latency() {
        let mut metrics = combiner_metrics(&agent(), &EvaluateResponse::default(), &TrackingTimestamps::default()).metrics;
        metrics.push(AgentMetric {
            agent_id: "0xidle".to_string(),
            timestamp: String::new(),
            name: METRIC_TX_REQUEST.to_string(),
            value: 1.0,
            shard_id: -1,
        });
        assert_eq!(active_bots(&metrics).into_iter().collect::<Vec<_>>(), vec!["0xbot"]);
    }
}
