// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Combiner alert feed.
//!
//! Polls an [`AlertSource`] for alerts raised by the bots that combiner bots
//! subscribed to, and delivers each (alert, subscriber) pair once. Every
//! query looks back over the configured window, so consecutive queries
//! overlap; the [`CombinerAlertCache`] filters what was already delivered.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::combiner_cache::CombinerAlertCache;
use super::Handler;
use crate::config::constants::{combiner_cache_ttl, COMBINER_CACHE_CLEANUP_INTERVAL};
use crate::config::CombinerConfig;
use crate::errors::{CacheError, FeedError};
use crate::health::{ErrorTracker, Reporter, Reports, TimeTracker};
use crate::tracing::spans;
use crate::types::combiner::{AlertEvent, CombinerBotSubscription, UpstreamAlert};

/// Where upstream alerts are queried from (e.g. the public alert API).
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// Returns alerts raised by any of `bot_ids` since `since`.
    ///
    /// Failures should be reported as [`FeedError::Query`]; they are logged
    /// and the query is repeated on the next tick.
    async fn alerts_for(
        &self,
        bot_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<UpstreamAlert>, FeedError>;
}

struct Subscriber {
    handler: Handler<AlertEvent>,
    done: oneshot::Sender<FeedError>,
}

#[derive(Default)]
struct Subscribers {
    active: Vec<Subscriber>,
    terminal: Option<FeedError>,
}

/// Delivers upstream alerts to subscribed combiner bots.
pub struct CombinerFeed {
    source: Arc<dyn AlertSource>,
    cache: Arc<CombinerAlertCache>,
    config: CombinerConfig,
    token: CancellationToken,
    subscriptions: RwLock<Vec<CombinerBotSubscription>>,
    subscribers: Mutex<Subscribers>,
    started: AtomicBool,
    last_query: TimeTracker,
    last_alert: TimeTracker,
    query_error: ErrorTracker,
}

impl CombinerFeed {
    /// Creates a feed whose cache is loaded from `config.cache_path`.
    pub fn new(
        source: Arc<dyn AlertSource>,
        config: CombinerConfig,
        token: CancellationToken,
    ) -> Result<Self, CacheError> {
        let cache = CombinerAlertCache::new(config.cache_path.clone())?
            .with_ttl(combiner_cache_ttl(config.look_back_window));
        Ok(Self::with_cache(source, Arc::new(cache), config, token))
    }

    /// Creates a feed around an existing cache.
    pub fn with_cache(
        source: Arc<dyn AlertSource>,
        cache: Arc<CombinerAlertCache>,
        config: CombinerConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            source,
            cache,
            config,
            token,
            subscriptions: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Subscribers::default()),
            started: AtomicBool::new(false),
            last_query: TimeTracker::new(),
            last_alert: TimeTracker::new(),
            query_error: ErrorTracker::new(),
        }
    }

    pub fn cache(&self) -> &Arc<CombinerAlertCache> {
        &self.cache
    }

    /// Adds a subscription; returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Rejects subscriptions without a source bot id and bots subscribing to
    /// themselves.
    pub fn add_subscription(&self, subscription: CombinerBotSubscription) -> Result<bool, FeedError> {
        let source = &subscription.subscription.bot_id;
        if source.is_empty() {
            return Err(FeedError::InvalidSubscription(
                "missing source bot id".to_string(),
            ));
        }
        if source.eq_ignore_ascii_case(&subscription.subscriber.bot_id) {
            return Err(FeedError::InvalidSubscription(format!(
                "bot {source} cannot subscribe to itself"
            )));
        }

        let mut subscriptions = self.write_subscriptions();
        if subscriptions.contains(&subscription) {
            return Ok(false);
        }
        info!(
            subscriber = %subscription.subscriber.bot_id,
            source = %source,
            "Added combiner subscription"
        );
        subscriptions.push(subscription);
        Ok(true)
    }

    /// Removes a subscription; returns `false` if it was not present.
    pub fn remove_subscription(&self, subscription: &CombinerBotSubscription) -> bool {
        let mut subscriptions = self.write_subscriptions();
        let before = subscriptions.len();
        subscriptions.retain(|s| s != subscription);
        let removed = subscriptions.len() != before;
        if removed {
            info!(
                subscriber = %subscription.subscriber.bot_id,
                source = %subscription.subscription.bot_id,
                "Removed combiner subscription"
            );
        }
        removed
    }

    pub fn subscriptions(&self) -> Vec<CombinerBotSubscription> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers a handler for alert events. The receiver yields the error
    /// that stopped the feed.
    pub fn register_handler(&self, handler: Handler<AlertEvent>) -> oneshot::Receiver<FeedError> {
        let (done, rx) = oneshot::channel();
        let mut guard = self.lock_subscribers();
        match &guard.terminal {
            Some(err) => {
                let _ = done.send(err.clone());
            }
            None => guard.active.push(Subscriber { handler, done }),
        }
        rx
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spawns the poll loop.
    pub fn start(self: &Arc<Self>) -> Result<(), FeedError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FeedError::AlreadyStarted);
        }
        let feed = Arc::clone(self);
        tokio::spawn(async move {
            let err = feed.run().await;
            feed.finish(err);
        });
        Ok(())
    }

    /// Persists the cache to its snapshot file, if it has one.
    pub async fn dump_cache(&self) -> Result<(), CacheError> {
        match self.cache.path() {
            Some(path) => self.cache.dump_to_file(path).await,
            None => Ok(()),
        }
    }

    /// Runs one query and delivers new alerts; returns how many were
    /// delivered.
    pub async fn poll(&self) -> Result<usize, FeedError> {
        let subscriptions = self.subscriptions();
        if subscriptions.is_empty() {
            return Ok(0);
        }
        async {
            let bot_ids: Vec<String> = subscriptions
                .iter()
                .map(|s| s.subscription.bot_id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let since = Utc::now() - self.look_back();

            let alerts = self.source.alerts_for(&bot_ids, since).await?;
            self.last_query.set();
            debug!(alerts = alerts.len(), bots = bot_ids.len(), "Queried combiner alerts");

            let mut delivered = 0;
            for alert in alerts {
                for subscription in subscriptions.iter().filter(|s| s.subscription.matches(&alert)) {
                    if self.cache.exists_for(subscription, &alert) {
                        continue;
                    }
                    let event = Arc::new(AlertEvent::new(
                        alert.clone(),
                        subscription.clone(),
                        Utc::now(),
                    ));
                    self.deliver(event).await?;
                    self.cache.set_for(subscription, &alert);
                    self.last_alert.set();
                    delivered += 1;
                }
            }
            Ok::<_, FeedError>(delivered)
        }
        .instrument(spans::poll_combiner_alerts(subscriptions.len()))
        .await
    }

    async fn run(&self) -> FeedError {
        let mut poll = tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = tokio::time::interval(COMBINER_CACHE_CLEANUP_INTERVAL);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_interval = ?self.config.poll_interval, "Combiner feed started");

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return FeedError::Cancelled,
                _ = cleanup.tick() => {
                    self.cache.purge_expired();
                }
                _ = poll.tick() => {
                    let polled = tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return FeedError::Cancelled,
                        polled = self.poll() => polled,
                    };
                    match polled {
                        Ok(delivered) => {
                            self.query_error.clear();
                            if delivered > 0 {
                                debug!(delivered, "Delivered combiner alerts");
                            }
                        }
                        Err(err @ FeedError::Query(_)) => {
                            warn!(error = %err, "Combiner alert query failed, retrying next tick");
                            self.query_error.set(&err);
                        }
                        Err(err) => return err,
                    }
                }
            }
        }
    }

    async fn deliver(&self, event: Arc<AlertEvent>) -> Result<(), FeedError> {
        let handlers: Vec<_> = self
            .lock_subscribers()
            .active
            .iter()
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler(Arc::clone(&event)).await?;
        }
        Ok(())
    }

    fn finish(&self, err: FeedError) {
        if err.is_cancelled() {
            info!("Combiner feed stopped");
        } else {
            warn!(error = %err, "Combiner feed stopped");
        }
        let subscribers = {
            let mut guard = self.lock_subscribers();
            guard.terminal = Some(err.clone());
            std::mem::take(&mut guard.active)
        };
        for subscriber in subscribers {
            let _ = subscriber.done.send(err.clone());
        }
    }

    fn look_back(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.look_back_window).unwrap_or(chrono::Duration::zero())
    }

    fn write_subscriptions(&self) -> std::sync::RwLockWriteGuard<'_, Vec<CombinerBotSubscription>> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reporter for CombinerFeed {
    fn name(&self) -> &str {
        "combiner-feed"
    }

    fn health(&self) -> Reports {
        vec![
            self.last_query.report("event.query.time"),
            self.last_alert.report("event.alert.time"),
            self.query_error.report("event.query.error"),
        ]
    }
}
