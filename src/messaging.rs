// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Message bus boundary.
//!
//! Inbound payloads are validated into [`SubscriptionMessage`] as soon as they
//! arrive; outbound publishing goes through [`MessageClient`].

use async_trait::async_trait;
use serde::Serialize;

use crate::analyzer::metrics::AgentMetricList;
use crate::config::constants::{
    SUBJECT_AGENTS_ALERT_SUBSCRIBE, SUBJECT_AGENTS_ALERT_UNSUBSCRIBE, SUBJECT_METRIC_AGENT,
};
use crate::errors::MessagingError;
use crate::types::combiner::CombinerBotSubscription;

/// A combiner subscription change received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionMessage {
    Subscribe(Vec<CombinerBotSubscription>),
    Unsubscribe(Vec<CombinerBotSubscription>),
}

impl SubscriptionMessage {
    /// Decodes a JSON payload received on `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::UnknownSubject`] for subjects other than the
    /// subscribe and unsubscribe subjects, and
    /// [`MessagingError::InvalidPayload`] when the payload is not a list of
    /// subscriptions.
    ///
    /// ```rust
    /// use alertscan::messaging::SubscriptionMessage;
    ///
    /// let payload = br#"[{"subscriber":{"botId":"0xsub"},"subscription":{"botId":"0xsrc"}}]"#;
    /// let message = SubscriptionMessage::from_subject("agents.alert.subscribe", payload).unwrap();
    /// assert!(matches!(message, SubscriptionMessage::Subscribe(subs) if subs.len() == 1));
    /// ```
    pub fn from_subject(subject: &str, payload: &[u8]) -> Result<Self, MessagingError> {
        let decode = || {
            serde_json::from_slice::<Vec<CombinerBotSubscription>>(payload)
                .map_err(|e| MessagingError::invalid_payload(subject, e))
        };
        match subject {
            SUBJECT_AGENTS_ALERT_SUBSCRIBE => Ok(Self::Subscribe(decode()?)),
            SUBJECT_AGENTS_ALERT_UNSUBSCRIBE => Ok(Self::Unsubscribe(decode()?)),
            other => Err(MessagingError::UnknownSubject(other.to_string())),
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => SUBJECT_AGENTS_ALERT_SUBSCRIBE,
            Self::Unsubscribe(_) => SUBJECT_AGENTS_ALERT_UNSUBSCRIBE,
        }
    }

    pub fn subscriptions(&self) -> &[CombinerBotSubscription] {
        match self {
            Self::Subscribe(subscriptions) | Self::Unsubscribe(subscriptions) => subscriptions,
        }
    }
}

/// Publishes JSON payloads on the message bus.
#[async_trait]
pub trait MessageClient: Send + Sync {
    async fn publish(&self, subject: &str, payload: serde_json::Value) -> Result<(), MessagingError>;

    /// Publishes bot metrics on [`SUBJECT_METRIC_AGENT`].
    async fn publish_metrics(&self, metrics: AgentMetricList) -> Result<(), MessagingError> {
        let payload = to_payload(SUBJECT_METRIC_AGENT, &metrics)?;
        self.publish(SUBJECT_METRIC_AGENT, payload).await
    }
}

fn to_payload<T: Serialize>(subject: &str, value: &T) -> Result<serde_json::Value, MessagingError> {
    serde_json::to_value(value).map_err(|e| MessagingError::invalid_payload(subject, e))
}
