// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Bot-to-bot ("combiner") alert subscriptions and the events they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{FindingType, Severity};
use super::block::TrackingTimestamps;
use super::message::AlertEventMessage;
use crate::errors::AnalyzerError;

/// Identity of a subscribing bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotInfo {
    pub bot_id: String,
    #[serde(default)]
    pub bot_owner: String,
    #[serde(default)]
    pub bot_image: String,
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSubscription {
    /// The source bot whose alerts are wanted
    pub bot_id: String,
    /// Alert ids to accept; empty accepts all
    #[serde(default)]
    pub alert_ids: Vec<String>,
    /// Chain to accept alerts from; `None` accepts all
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl BotSubscription {
    /// Returns `true` if `alert` passes this subscription's filters.
    pub fn matches(&self, alert: &UpstreamAlert) -> bool {
        let Some(source) = &alert.source else {
            return false;
        };
        if !source.bot.id.eq_ignore_ascii_case(&self.bot_id) {
            return false;
        }
        if !self.alert_ids.is_empty() && !self.alert_ids.contains(&alert.alert_id) {
            return false;
        }
        match (self.chain_id, &source.block) {
            (None, _) => true,
            (Some(chain_id), Some(block)) => block.chain_id == chain_id,
            (Some(_), None) => false,
        }
    }
}

/// A subscriber paired with its subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinerBotSubscription {
    pub subscriber: BotInfo,
    pub subscription: BotSubscription,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBot {
    pub id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBlock {
    pub chain_id: u64,
    pub number: u64,
    pub hash: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Where an upstream alert came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSourceInfo {
    pub bot: SourceBot,
    #[serde(default)]
    pub block: Option<SourceBlock>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// An alert published by another bot, as returned by the alert source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamAlert {
    /// Network-wide alert hash
    pub hash: String,
    pub alert_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub finding_type: FindingType,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<AlertSourceInfo>,
}

/// An upstream alert routed to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub alert: UpstreamAlert,
    pub subscriber: BotInfo,
    pub subscription: CombinerBotSubscription,
    pub timestamps: TrackingTimestamps,
}

impl AlertEvent {
    pub fn new(
        alert: UpstreamAlert,
        subscription: CombinerBotSubscription,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamps = TrackingTimestamps {
            feed: Some(now),
            source_alert: alert.created_at,
            ..Default::default()
        };
        Self {
            subscriber: subscription.subscriber.clone(),
            alert,
            subscription,
            timestamps,
        }
    }

    /// Builds the wire message sent to the subscribing combiner bot.
    ///
    /// Alerts without a source bot cannot be attributed and are rejected.
    pub fn to_message(&self) -> Result<AlertEventMessage, AnalyzerError> {
        match &self.alert.source {
            Some(source) if !source.bot.id.is_empty() => Ok(AlertEventMessage {
                alert: self.alert.clone(),
                timestamps: self.timestamps.clone(),
            }),
            _ => Err(AnalyzerError::transform(
                format!("alert {}", self.alert.hash),
                "alert has no source bot",
            )),
        }
    }
}
