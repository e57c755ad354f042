// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Findings returned by bots and the alerts built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::block::TrackingTimestamps;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Unknown,
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "UNKNOWN",
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingType {
    #[default]
    Unknown,
    Exploit,
    Suspicious,
    Degraded,
    Info,
    Scam,
}

impl FindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::Unknown => "UNKNOWN",
            FindingType::Exploit => "EXPLOIT",
            FindingType::Suspicious => "SUSPICIOUS",
            FindingType::Degraded => "DEGRADED",
            FindingType::Info => "INFO",
            FindingType::Scam => "SCAM",
        }
    }
}

/// An entity label attached to a finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub entity_type: String,
    pub entity: String,
    pub label: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub remove: bool,
}

/// A bot's raw detection output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub name: String,
    pub description: String,
    pub alert_id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(rename = "type", default)]
    pub finding_type: FindingType,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub unique_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Block,
    Transaction,
    Combination,
    Private,
}

/// Identity of the bot that produced an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    pub image: String,
    #[serde(default)]
    pub image_hash: String,
    #[serde(default)]
    pub manifest: String,
}

/// Serialized form of an address bloom filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloomFilterMessage {
    /// Number of hash functions
    pub k: u32,
    /// Size in bits
    pub m: u64,
    /// Hex-encoded bitset, least significant bit first within each byte
    pub bitset: String,
    pub item_count: u32,
}

/// The externally visible unit produced from one finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub finding: Finding,
    /// RFC 3339 with nanoseconds, UTC
    pub timestamp: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub agent: AgentInfo,
    pub tags: BTreeMap<String, String>,
    pub address_bloom_filter: Option<BloomFilterMessage>,
    pub truncated: bool,
    pub timestamps: TrackingTimestamps,
}
