// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Deterministic alert ids.
//!
//! An alert id is `keccak256` over a canonical encoding of the event that
//! triggered the bot, the finding, and the bot identity. Every field is
//! written as a big-endian `u64` length followed by its bytes, after a tag
//! naming the alert kind, so no two different inputs share an encoding.
//! Collections are written as a count followed by their elements; metadata
//! is ordered by key.
//!
//! Ids are computed before truncation, over the finding as the bot sent it.

use alloy_primitives::keccak256;

use crate::types::alert::Finding;
use crate::types::message::{AlertEventMessage, BlockEventMessage, TransactionEventMessage};

/// The bot that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotIdentity<'a> {
    pub bot_id: &'a str,
    pub bot_image: &'a str,
}

/// Id of an alert raised for a block.
pub fn for_block_alert(event: &BlockEventMessage, finding: &Finding, bot: BotIdentity<'_>) -> String {
    let mut encoder = Encoder::new("block");
    encoder
        .str(&event.network.chain_id)
        .str(&event.block_hash)
        .str(&event.block_number);
    encoder.finding(finding).bot(bot);
    encoder.finish()
}

/// Id of an alert raised for a transaction.
pub fn for_transaction_alert(
    event: &TransactionEventMessage,
    finding: &Finding,
    bot: BotIdentity<'_>,
) -> String {
    let mut encoder = Encoder::new("transaction");
    encoder
        .str(&event.network.chain_id)
        .str(&event.block.block_hash)
        .str(&event.transaction.hash);
    encoder.finding(finding).bot(bot);
    encoder.finish()
}

/// Id of an alert a combiner bot raised for an upstream alert.
pub fn for_combination_alert(
    event: &AlertEventMessage,
    finding: &Finding,
    bot: BotIdentity<'_>,
) -> String {
    let mut encoder = Encoder::new("combination");
    encoder.str(&event.alert.hash);
    encoder.finding(finding).bot(bot);
    encoder.finish()
}

struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn new(kind: &str) -> Self {
        let mut encoder = Self {
            buf: Vec::with_capacity(512),
        };
        encoder.str("alertscan.alert.v1").str(kind);
        encoder
    }

    fn len(&mut self, len: usize) -> &mut Self {
        self.buf.extend_from_slice(&(len as u64).to_be_bytes());
        self
    }

    fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.len(bytes.len());
        self.buf.extend_from_slice(bytes);
        self
    }

    fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    fn bool(&mut self, value: bool) -> &mut Self {
        self.bytes(&[u8::from(value)])
    }

    fn finding(&mut self, finding: &Finding) -> &mut Self {
        self.str(&finding.name)
            .str(&finding.description)
            .str(&finding.alert_id)
            .str(&finding.protocol)
            .str(finding.severity.as_str())
            .str(finding.finding_type.as_str());

        self.len(finding.metadata.len());
        for (key, value) in &finding.metadata {
            self.str(key).str(value);
        }

        self.len(finding.addresses.len());
        for address in &finding.addresses {
            self.str(address);
        }

        self.len(finding.labels.len());
        for label in &finding.labels {
            self.str(&label.entity_type)
                .str(&label.entity)
                .str(&label.label)
                .bytes(&label.confidence.to_bits().to_be_bytes())
                .bool(label.remove);
        }

        self.bool(finding.private).str(&finding.unique_key)
    }

    fn bot(&mut self, bot: BotIdentity<'_>) -> &mut Self {
        self.str(bot.bot_id).str(bot.bot_image)
    }

    fn finish(&self) -> String {
        format!("{:#x}", keccak256(&self.buf))
    }
}
