// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Wire messages exchanged with bots.
//!
//! Quantities are `0x`-prefixed hex strings and addresses are lowercase, so
//! every message has one canonical JSON form.

use std::collections::BTreeSet;

use alloy_rpc_types::Log;
use serde::{Deserialize, Serialize};

use super::alert::Finding;
use super::block::{lower_hex, Trace, TrackingTimestamps};
use super::combiner::UpstreamAlert;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMessage {
    /// Hex chain id (e.g. `0x1`)
    pub chain_id: String,
}

impl NetworkMessage {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id: format!("{chain_id:#x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfoMessage {
    pub block_hash: String,
    pub block_number: String,
    pub block_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub value: String,
    pub gas: String,
    pub gas_price: Option<String>,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: Option<String>,
    pub transaction_hash: Option<String>,
}

impl From<&Log> for LogMessage {
    fn from(log: &Log) -> Self {
        Self {
            address: lower_hex(&log.inner.address),
            topics: log
                .inner
                .data
                .topics()
                .iter()
                .map(|topic| format!("{topic:#x}"))
                .collect(),
            data: format!("0x{}", hex::encode(&log.inner.data.data)),
            log_index: log.log_index.map(|index| format!("{index:#x}")),
            transaction_hash: log.transaction_hash.map(|hash| format!("{hash:#x}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMessage {
    pub hash: String,
    pub parent_hash: String,
    pub number: String,
    pub timestamp: String,
    pub base_fee_per_gas: Option<String>,
    /// Transaction hashes in block order
    pub transactions: Vec<String>,
}

/// A block as sent to block bots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEventMessage {
    pub block_hash: String,
    pub block_number: String,
    pub network: NetworkMessage,
    pub block: BlockMessage,
    pub logs: Vec<LogMessage>,
    pub traces: Vec<Trace>,
    pub timestamps: TrackingTimestamps,
}

/// A transaction as sent to transaction bots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEventMessage {
    pub transaction: TransactionMessage,
    pub network: NetworkMessage,
    pub block: BlockInfoMessage,
    pub logs: Vec<LogMessage>,
    pub traces: Vec<Trace>,
    /// Lowercased addresses touched by the transaction
    pub addresses: BTreeSet<String>,
    pub timestamps: TrackingTimestamps,
}

/// An upstream alert as sent to combiner bots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEventMessage {
    pub alert: UpstreamAlert,
    pub timestamps: TrackingTimestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateTxRequest {
    pub request_id: String,
    pub event: TransactionEventMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateBlockRequest {
    pub request_id: String,
    pub event: BlockEventMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateAlertRequest {
    pub request_id: String,
    pub target_bot_id: String,
    pub event: AlertEventMessage,
}

/// A bot's answer to any evaluation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Marks every finding of the response as private
    #[serde(default)]
    pub private: bool,
    /// Time the bot spent evaluating, as reported by the bot
    #[serde(default)]
    pub latency_ms: u32,
}
