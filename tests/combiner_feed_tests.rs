// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the combiner alert feed and stream service

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alertscan::feeds::handler_fn;
use alertscan::health::Status;
use alertscan::{
    AlertEvent, CombinerAlertCache, CombinerAlertStreamService, CombinerFeed, FeedError, Reporter,
    ScannerConfig, SubscriptionMessage,
};
use helpers::{subscription, upstream_alert, MockAlertSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Delivered = Arc<Mutex<Vec<(String, String)>>>;

fn new_feed(source: Arc<MockAlertSource>, token: CancellationToken) -> Arc<CombinerFeed> {
    Arc::new(CombinerFeed::with_cache(
        source,
        Arc::new(CombinerAlertCache::in_memory()),
        ScannerConfig::minimal().combiner,
        token,
    ))
}

/// Registers a handler recording (subscriber, alert hash) pairs.
fn record_deliveries(feed: &CombinerFeed) -> Delivered {
    let delivered: Delivered = Arc::default();
    let recorded = Arc::clone(&delivered);
    let _done = feed.register_handler(handler_fn(move |event: Arc<AlertEvent>| {
        let recorded = Arc::clone(&recorded);
        async move {
            recorded
                .lock()
                .unwrap()
                .push((event.subscriber.bot_id.clone(), event.alert.hash.clone()));
            Ok(())
        }
    }));
    delivered
}

/// Each alert reaches every matching subscriber exactly once across
/// overlapping queries
#[tokio::test]
async fn test_poll_delivers_once_per_subscriber() {
    let source = Arc::new(MockAlertSource::with_alerts(vec![
        upstream_alert("0xa1", "0xsource", 1),
        upstream_alert("0xa2", "0xunrelated", 1),
    ]));
    let feed = new_feed(Arc::clone(&source), CancellationToken::new());
    let delivered = record_deliveries(&feed);
    feed.add_subscription(subscription("0xcombiner1", "0xsource")).unwrap();
    feed.add_subscription(subscription("0xcombiner2", "0xsource")).unwrap();

    assert_eq!(feed.poll().await.unwrap(), 2);
    assert_eq!(feed.poll().await.unwrap(), 0, "second query overlaps the first");

    let mut pairs = delivered.lock().unwrap().clone();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("0xcombiner1".to_string(), "0xa1".to_string()),
            ("0xcombiner2".to_string(), "0xa1".to_string()),
        ]
    );
    assert_eq!(feed.cache().len(), 2);
}

/// Alert id and chain filters of a subscription are honoured
#[tokio::test]
async fn test_subscription_filters() {
    let source = Arc::new(MockAlertSource::with_alerts(vec![upstream_alert(
        "0xa1", "0xsource", 137,
    )]));
    let feed = new_feed(source, CancellationToken::new());
    let delivered = record_deliveries(&feed);

    let mut by_alert_id = subscription("0xcombiner1", "0xsource");
    by_alert_id.subscription.alert_ids = vec!["OTHER-ALERT".to_string()];
    let mut by_chain = subscription("0xcombiner2", "0xsource");
    by_chain.subscription.chain_id = Some(1);
    let mut matching = subscription("0xcombiner3", "0xsource");
    matching.subscription.chain_id = Some(137);
    for sub in [by_alert_id, by_chain, matching] {
        feed.add_subscription(sub).unwrap();
    }

    assert_eq!(feed.poll().await.unwrap(), 1);
    assert_eq!(delivered.lock().unwrap()[0].0, "0xcombiner3");
}

/// Without subscriptions the source is never queried
#[tokio::test]
async fn test_no_subscriptions_no_query() {
    let source = Arc::new(MockAlertSource::default());
    let feed = new_feed(Arc::clone(&source), CancellationToken::new());

    assert_eq!(feed.poll().await.unwrap(), 0);
    assert_eq!(source.queries(), 0);
}

/// A failing query is retried on the next tick and the error shows in health
/// until a query succeeds
#[tokio::test]
async fn test_query_failure_is_retried() {
    let source = Arc::new(MockAlertSource::with_alerts(vec![upstream_alert(
        "0xa1", "0xsource", 1,
    )]));
    source.fail_next(2);
    let token = CancellationToken::new();
    let feed = new_feed(Arc::clone(&source), token.clone());
    let delivered = record_deliveries(&feed);
    feed.add_subscription(subscription("0xcombiner", "0xsource")).unwrap();

    feed.start().unwrap();
    let query_error_cleared = || {
        feed.health()
            .into_iter()
            .any(|report| report.name == "event.query.error" && report.status == Status::Ok)
    };
    helpers::eventually("alert delivery after retries", || {
        !delivered.lock().unwrap().is_empty() && query_error_cleared()
    })
    .await;
    token.cancel();

    assert!(source.queries() >= 3);
    assert_eq!(delivered.lock().unwrap().len(), 1);
}

/// A failing handler stops the feed and every subscriber learns why
#[tokio::test]
async fn test_handler_error_is_terminal() {
    let source = Arc::new(MockAlertSource::with_alerts(vec![upstream_alert(
        "0xa1", "0xsource", 1,
    )]));
    let feed = new_feed(source, CancellationToken::new());
    let done = feed.register_handler(handler_fn(|_event: Arc<AlertEvent>| async move {
        Err(FeedError::handler_message("bot pool full"))
    }));
    feed.add_subscription(subscription("0xcombiner", "0xsource")).unwrap();

    feed.start().unwrap();
    let terminal = tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(terminal, FeedError::Handler(_)));
    assert!(
        feed.cache().is_empty(),
        "an undelivered alert must not be cached"
    );
}

/// The stream service applies bus messages and forwards alert events
#[tokio::test]
async fn test_stream_applies_subscriptions_and_forwards_alerts() {
    helpers::init_tracing();
    let source = Arc::new(MockAlertSource::with_alerts(vec![upstream_alert(
        "0xa1", "0xsource", 1,
    )]));
    let token = CancellationToken::new();
    let feed = new_feed(Arc::clone(&source), token.child_token());
    let (bus, messages) = mpsc::channel(8);
    let stream = Arc::new(CombinerAlertStreamService::new(
        Arc::clone(&feed),
        messages,
        token.child_token(),
    ));
    let mut alerts = stream.read_only_alert_stream().unwrap();
    let task = stream.start().unwrap();

    bus.send(SubscriptionMessage::Subscribe(vec![
        subscription("0xcombiner", "0xsource"),
        subscription("0xself", "0xself"),
    ]))
    .await
    .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), alerts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.subscriber.bot_id, "0xcombiner");
    assert_eq!(event.alert.hash, "0xa1");
    assert_eq!(feed.subscriptions().len(), 1, "self subscription is rejected");

    bus.send(SubscriptionMessage::Unsubscribe(vec![subscription(
        "0xcombiner",
        "0xsource",
    )]))
    .await
    .unwrap();
    helpers::eventually("unsubscribe", || feed.subscriptions().is_empty()).await;

    token.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(stream.health()[0].status, Status::Ok);
}
