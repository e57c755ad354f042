// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::sync::Arc;

/// Terminal errors reported by the block, transaction and combiner feeds.
///
/// A feed delivers exactly one of these to each subscriber when it stops, so the
/// type is `Clone` and keeps handler failures behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// The feed was cancelled through its cancellation token.
    #[error("Feed cancelled")]
    Cancelled,

    /// A bounded range finished after emitting its end block.
    ///
    /// This is the normal way a ranged feed stops and is not a failure.
    #[error("End block reached")]
    EndBlockReached,

    /// A registered handler returned an error.
    #[error("Handler failed: {0}")]
    Handler(Arc<dyn Error + Send + Sync>),

    /// The transaction feed was configured with zero workers.
    #[error("Workers must be > 0")]
    InvalidWorkerCount,

    /// A combiner subscription was rejected.
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    /// The alert source query failed; the combiner feed retries next tick.
    #[error("Alert query failed: {0}")]
    Query(Arc<dyn Error + Send + Sync>),

    /// `start` was called on a feed that is already running.
    #[error("Feed already started")]
    AlreadyStarted,

    /// A feed task panicked or was aborted.
    #[error("Feed task failed: {0}")]
    TaskFailed(String),
}

impl FeedError {
    /// Wraps any error returned by a handler.
    pub fn handler(source: impl Error + Send + Sync + 'static) -> Self {
        FeedError::Handler(Arc::new(source))
    }

    /// Creates a handler error from a plain message.
    pub fn handler_message(message: impl Into<String>) -> Self {
        let boxed: Box<dyn Error + Send + Sync> = message.into().into();
        FeedError::Handler(Arc::from(boxed))
    }

    /// Wraps an alert source failure.
    pub fn query(source: impl Error + Send + Sync + 'static) -> Self {
        FeedError::Query(Arc::new(source))
    }

    /// Returns `true` when the feed stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FeedError::Cancelled)
    }

    /// Returns `true` when a ranged feed finished normally.
    pub fn is_end_of_range(&self) -> bool {
        matches!(self, FeedError::EndBlockReached)
    }
}

impl From<tokio::task::JoinError> for FeedError {
    fn from(err: tokio::task::JoinError) -> Self {
        FeedError::TaskFailed(err.to_string())
    }
}
