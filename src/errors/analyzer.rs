// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while turning bot results into alerts.
///
/// `Transform` is recovered locally: the finding is logged and dropped.
/// `Delivery` is fatal: it ends the output gear and reaches the supervisor
/// through [`AnalyzerHandle::wait`](crate::analyzer::AnalyzerHandle::wait).
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// The alert sender failed to accept a result the pipeline already committed to.
    #[error("Failed to deliver {what}")]
    Delivery {
        /// What was being delivered (e.g., "alert 0xabc..")
        what: String,
        /// The error returned by the alert sender
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single finding or event could not be converted.
    #[error("Failed to transform {what}: {reason}")]
    Transform {
        /// The item that failed to convert
        what: String,
        /// Why the conversion failed
        reason: String,
    },

    /// `start` was called twice; the input channels were already taken.
    #[error("Analyzer already started")]
    AlreadyStarted,

    /// One of the analyzer gears panicked or was aborted.
    #[error("Analyzer task failed: {0}")]
    TaskFailed(String),
}

impl AnalyzerError {
    /// Helper to create a `Delivery` error from any error type.
    pub fn delivery(
        what: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AnalyzerError::Delivery {
            what: what.into(),
            source: source.into(),
        }
    }

    /// Helper to create a `Transform` error.
    pub fn transform(what: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalyzerError::Transform {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that must stop the analyzer.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AnalyzerError::Transform { .. })
    }
}

impl From<tokio::task::JoinError> for AnalyzerError {
    fn from(err: tokio::task::JoinError) -> Self {
        AnalyzerError::TaskFailed(err.to_string())
    }
}
