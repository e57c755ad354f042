// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Stream services: run a feed and expose its events as channels for the
//! analyzers.
//!
//! Each output receiver can be taken exactly once. The output channels close
//! when the underlying feed stops.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::FeedError;

pub mod combiner_stream;
pub mod tx_stream;

pub use combiner_stream::CombinerAlertStreamService;
pub use tx_stream::TxStreamService;

/// Sends `event` unless the stream is cancelled first.
async fn forward<T>(
    token: &CancellationToken,
    output: &mpsc::Sender<Arc<T>>,
    event: Arc<T>,
    stream: &'static str,
) -> Result<(), FeedError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FeedError::Cancelled),
        sent = output.send(event) => sent.map_err(|_| {
            FeedError::handler_message(format!("{stream} receiver dropped"))
        }),
    }
}
