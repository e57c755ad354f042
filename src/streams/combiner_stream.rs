// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::forward;
use crate::config::constants::ALERT_CHANNEL_CAPACITY;
use crate::errors::FeedError;
use crate::feeds::alerts::CombinerFeed;
use crate::feeds::handler_fn;
use crate::health::{Reporter, Reports, TimeTracker};
use crate::messaging::SubscriptionMessage;
use crate::types::combiner::AlertEvent;

/// Applies subscription messages from the bus to a [`CombinerFeed`] and
/// emits its alert events on a channel.
pub struct CombinerAlertStreamService {
    feed: Arc<CombinerFeed>,
    token: CancellationToken,
    messages: Mutex<Option<mpsc::Receiver<SubscriptionMessage>>>,
    output: Mutex<Option<mpsc::Sender<Arc<AlertEvent>>>>,
    alert_stream: Mutex<Option<mpsc::Receiver<Arc<AlertEvent>>>>,
    last_alert: TimeTracker,
}

impl CombinerAlertStreamService {
    pub fn new(
        feed: Arc<CombinerFeed>,
        messages: mpsc::Receiver<SubscriptionMessage>,
        token: CancellationToken,
    ) -> Self {
        let (output, alert_stream) = mpsc::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            feed,
            token,
            messages: Mutex::new(Some(messages)),
            output: Mutex::new(Some(output)),
            alert_stream: Mutex::new(Some(alert_stream)),
            last_alert: TimeTracker::new(),
        }
    }

    /// Takes the alert channel; `None` after the first call.
    pub fn read_only_alert_stream(&self) -> Option<mpsc::Receiver<Arc<AlertEvent>>> {
        self.alert_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Applies one bus message and returns how many subscriptions changed.
    /// Rejected subscriptions are logged and skipped.
    pub fn apply(&self, message: &SubscriptionMessage) -> usize {
        match message {
            SubscriptionMessage::Subscribe(subscriptions) => subscriptions
                .iter()
                .map(|subscription| match self.feed.add_subscription(subscription.clone()) {
                    Ok(added) => added,
                    Err(err) => {
                        warn!(
                            subscriber_bot = %subscription.subscriber.bot_id,
                            subscribes_to = %subscription.subscription.bot_id,
                            error = %err,
                            "Cannot add subscription"
                        );
                        false
                    }
                })
                .filter(|added| *added)
                .count(),
            SubscriptionMessage::Unsubscribe(subscriptions) => subscriptions
                .iter()
                .filter(|subscription| self.feed.remove_subscription(subscription))
                .count(),
        }
    }

    /// Registers the forwarding handler, starts the feed and spawns the
    /// message loop.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::AlreadyStarted`] on a second call or when the feed
    /// was started elsewhere.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<Result<(), FeedError>>, FeedError> {
        let output = self
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(FeedError::AlreadyStarted)?;
        let messages = self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(FeedError::AlreadyStarted)?;

        let handler = {
            let service = Arc::clone(self);
            handler_fn(move |event: Arc<AlertEvent>| {
                let service = Arc::clone(&service);
                let output = output.clone();
                async move {
                    debug!(
                        subscribee = %event.subscription.subscription.bot_id,
                        alert = %event.alert.hash,
                        subscriber_bot = %event.subscriber.bot_id,
                        subscriber_image = %event.subscriber.bot_image,
                        "Streaming alert event"
                    );
                    forward(&service.token, &output, event, "alert stream").await?;
                    service.last_alert.set();
                    Ok(())
                }
            })
        };
        let done = self.feed.register_handler(handler);
        self.feed.start()?;
        Ok(tokio::spawn(Arc::clone(self).run(messages, done)))
    }

    async fn run(
        self: Arc<Self>,
        mut messages: mpsc::Receiver<SubscriptionMessage>,
        mut done: oneshot::Receiver<FeedError>,
    ) -> Result<(), FeedError> {
        let mut bus_open = true;
        let terminal = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break FeedError::Cancelled,
                terminal = &mut done => {
                    break terminal.unwrap_or_else(|_| {
                        FeedError::TaskFailed("combiner feed dropped the subscription".to_string())
                    });
                }
                message = messages.recv(), if bus_open => match message {
                    Some(message) => {
                        let changed = self.apply(&message);
                        debug!(subject = message.subject(), changed, "Applied subscription message");
                    }
                    None => {
                        info!("Subscription bus closed, keeping current subscriptions");
                        bus_open = false;
                    }
                },
            }
        };

        if terminal.is_cancelled() {
            info!("Combiner alert stream stopped");
            return Ok(());
        }
        error!(error = %terminal, "Combiner feed failed");
        Err(terminal)
    }
}

impl Reporter for CombinerAlertStreamService {
    fn name(&self) -> &str {
        "combiner-alert-stream"
    }

    fn health(&self) -> Reports {
        vec![self.last_alert.report("event.alert.time")]
    }
}
