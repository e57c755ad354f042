// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Chain data flowing through the feeds: blocks, transactions, traces and the
//! events that wrap them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::Log;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{
    BlockEventMessage, BlockInfoMessage, BlockMessage, LogMessage, NetworkMessage,
    TransactionEventMessage, TransactionMessage,
};

/// A transaction as carried inside a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas: u64,
    pub gas_price: Option<u128>,
    pub input: Bytes,
}

/// An immutable block snapshot. Identity is the block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: u64,
    /// Unix seconds
    pub timestamp: u64,
    pub base_fee_per_gas: Option<u64>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block time as a UTC datetime, if the timestamp is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.timestamp).ok()?;
        DateTime::from_timestamp(secs, 0)
    }

    /// Returns `true` when the block was produced more than `max_age` before `now`.
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let Some(block_time) = self.time() else {
            return false;
        };
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => block_time < now - max_age,
            Err(_) => false,
        }
    }
}

/// The call frame of a parity-style trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceAction {
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub input: Option<Bytes>,
    #[serde(default)]
    pub call_type: Option<String>,
}

/// A parity-style trace as returned by `trace_block`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub action: TraceAction,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub transaction_position: Option<u64>,
    #[serde(default)]
    pub subtraces: u64,
    #[serde(default)]
    pub trace_address: Vec<u64>,
    #[serde(rename = "type", default)]
    pub trace_type: String,
}

/// Stage timestamps used for latency metrics.
///
/// Each field is stamped once when the event crosses that stage boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_request: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_response: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_alert: Option<DateTime<Utc>>,
}

/// A block plus its logs and traces, emitted once by the block feed.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEvent {
    pub chain_id: u64,
    pub block: Block,
    pub logs: Vec<Log>,
    pub traces: Vec<Trace>,
    pub timestamps: TrackingTimestamps,
}

impl BlockEvent {
    /// Builds the wire message sent to block bots.
    pub fn to_message(&self) -> BlockEventMessage {
        let block = &self.block;
        BlockEventMessage {
            block_hash: format!("{:#x}", block.hash),
            block_number: format!("{:#x}", block.number),
            network: NetworkMessage::new(self.chain_id),
            block: BlockMessage {
                hash: format!("{:#x}", block.hash),
                parent_hash: format!("{:#x}", block.parent_hash),
                number: format!("{:#x}", block.number),
                timestamp: format!("{:#x}", block.timestamp),
                base_fee_per_gas: block.base_fee_per_gas.map(|fee| format!("{fee:#x}")),
                transactions: block
                    .transactions
                    .iter()
                    .map(|tx| format!("{:#x}", tx.hash))
                    .collect(),
            },
            logs: self.logs.iter().map(LogMessage::from).collect(),
            traces: self.traces.clone(),
            timestamps: self.timestamps.clone(),
        }
    }

    fn block_info(&self) -> BlockInfoMessage {
        BlockInfoMessage {
            block_hash: format!("{:#x}", self.block.hash),
            block_number: format!("{:#x}", self.block.number),
            block_timestamp: format!("{:#x}", self.block.timestamp),
        }
    }
}

/// One transaction of a block that survived deduplication.
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub block: Arc<BlockEvent>,
    pub transaction: Transaction,
    pub timestamps: TrackingTimestamps,
}

impl TransactionEvent {
    /// Wraps `transaction`, copying the block timestamp and stamping the feed time.
    pub fn new(block: Arc<BlockEvent>, transaction: Transaction, now: DateTime<Utc>) -> Self {
        let timestamps = TrackingTimestamps {
            block: block.timestamps.block,
            feed: Some(now),
            ..Default::default()
        };
        Self {
            block,
            transaction,
            timestamps,
        }
    }

    /// Logs emitted by this transaction.
    pub fn logs(&self) -> impl Iterator<Item = &Log> {
        let hash = self.transaction.hash;
        self.block
            .logs
            .iter()
            .filter(move |log| log.transaction_hash == Some(hash))
    }

    /// Traces belonging to this transaction.
    pub fn traces(&self) -> impl Iterator<Item = &Trace> {
        let hash = self.transaction.hash;
        self.block
            .traces
            .iter()
            .filter(move |trace| trace.transaction_hash == Some(hash))
    }

    /// Every address the transaction touched, lowercased with a `0x` prefix.
    ///
    /// Covers the sender, the recipient, log emitters and trace call frames.
    pub fn touched_addresses(&self) -> BTreeSet<String> {
        let mut addresses = BTreeSet::new();
        addresses.insert(lower_hex(&self.transaction.from));
        if let Some(to) = &self.transaction.to {
            addresses.insert(lower_hex(to));
        }
        for log in self.logs() {
            addresses.insert(lower_hex(&log.inner.address));
        }
        for trace in self.traces() {
            if let Some(from) = &trace.action.from {
                addresses.insert(lower_hex(from));
            }
            if let Some(to) = &trace.action.to {
                addresses.insert(lower_hex(to));
            }
        }
        addresses
    }

    /// Builds the wire message sent to transaction bots.
    pub fn to_message(&self) -> TransactionEventMessage {
        let tx = &self.transaction;
        TransactionEventMessage {
            transaction: TransactionMessage {
                hash: format!("{:#x}", tx.hash),
                from: lower_hex(&tx.from),
                to: tx.to.as_ref().map(lower_hex),
                nonce: format!("{:#x}", tx.nonce),
                value: format!("{:#x}", tx.value),
                gas: format!("{:#x}", tx.gas),
                gas_price: tx.gas_price.map(|price| format!("{price:#x}")),
                input: format!("0x{}", hex::encode(&tx.input)),
            },
            network: NetworkMessage::new(self.block.chain_id),
            block: self.block.block_info(),
            logs: self.logs().map(LogMessage::from).collect(),
            traces: self.traces().cloned().collect(),
            addresses: self.touched_addresses(),
            timestamps: self.timestamps.clone(),
        }
    }
}

pub(crate) fn lower_hex(address: &Address) -> String {
    format!("{address:#x}")
}
