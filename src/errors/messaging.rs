// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

/// Errors at the messaging bus boundary.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// The subject is not one this node handles.
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    /// The payload did not match the schema for its subject.
    #[error("Invalid payload for {subject}")]
    InvalidPayload {
        /// The subject the payload arrived on
        subject: String,
        /// The underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// Publishing to the bus failed.
    #[error("Failed to publish to {subject}")]
    PublishFailed {
        /// The subject being published to
        subject: String,
        /// The underlying client error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl MessagingError {
    /// Helper to create an `InvalidPayload` error.
    pub fn invalid_payload(subject: impl Into<String>, source: serde_json::Error) -> Self {
        MessagingError::InvalidPayload {
            subject: subject.into(),
            source,
        }
    }

    /// Helper to create a `PublishFailed` error from any error type.
    pub fn publish_failed(
        subject: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MessagingError::PublishFailed {
            subject: subject.into(),
            source: Box::new(source),
        }
    }
}
