//! End-to-end tests for the sync client
//!
//! Each test runs a real `SyncClient` against the in-process fake transport;
//! the test body plays the server side of the live channel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use integration_tests::{
    alert_broadcast, alert_change, alert_update_broadcast, feedback_broadcast, feedback_draft,
    test_config, wait_for, FakeTransport, RecordingRest,
};
use pulse_common::{HeartbeatConfig, SyncError};
use pulse_core::{AlertStatus, ChannelKind, EventId, Origin, Sentiment, SourceId};
use pulse_sync::protocol::{ClientMessage, ServerMessage};
use pulse_sync::{AckVia, AggregateSnapshot, RestApi, SyncClient, SubscriptionPhase, Transport};

fn event() -> EventId {
    EventId::from("evt-1")
}

#[tokio::test]
async fn test_feedback_submission_end_to_end() {
    let (transport, mut handles) = FakeTransport::new();
    let rest = RecordingRest::new();
    let client = SyncClient::new(test_config(), transport, rest);

    client.connect("token-1").await.unwrap();
    let mut handle = handles.recv().await.unwrap();
    assert_eq!(handle.expect_identify().await, "token-1");

    client.join(event(), ChannelKind::Feed).await.unwrap();
    assert!(matches!(handle.recv().await, ClientMessage::JoinEvent { .. }));

    let source_id = SourceId::generate();
    let draft = feedback_draft(&event(), "Great talk!", source_id);

    let server = async {
        let frame = handle.recv().await;
        let ClientMessage::SubmitFeedback(request) = frame else {
            panic!("expected submit-feedback, got {frame:?}");
        };
        assert_eq!(request.text, "Great talk!");
        assert_eq!(request.source_id, source_id);

        handle
            .send(ServerMessage::FeedbackReceived { source_id })
            .await;
        // The confirmed broadcast echoes the same source ID with the score
        handle
            .send(feedback_broadcast(&event(), source_id, "Great talk!", "positive"))
            .await;
        handle
    };

    let (ack, _handle) = tokio::join!(client.submit_feedback(draft), server);
    assert_eq!(ack.unwrap().via, AckVia::Transport);

    let client2 = Arc::clone(&client);
    assert!(
        wait_for(move || {
            client2
                .aggregate(&event())
                .is_some_and(|a| a.count(Sentiment::Positive) == 1 && a.feed[0].confirmed)
        })
        .await
    );

    // One submission, one feed item: the echo replaced the optimistic copy
    let aggregate = client.aggregate(&event()).unwrap();
    assert_eq!(aggregate.feed.len(), 1);
    assert_eq!(aggregate.feed[0].text, "Great talk!");

    let snapshot = client.channel_snapshot(&event(), ChannelKind::Feed);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].origin, Origin::ServerConfirmed);
}

#[tokio::test]
async fn test_redelivered_broadcast_is_not_double_counted() {
    let (transport, mut handles) = FakeTransport::new();
    let client = SyncClient::new(test_config(), transport, RecordingRest::new());

    client.connect("token").await.unwrap();
    let mut handle = handles.recv().await.unwrap();
    handle.expect_identify().await;

    client.join(event(), ChannelKind::Feed).await.unwrap();
    handle.recv().await;

    let source_id = SourceId::generate();
    let broadcast = feedback_broadcast(&event(), source_id, "loved it", "positive");
    handle.send(broadcast.clone()).await;
    handle.send(broadcast).await;

    let client2 = Arc::clone(&client);
    assert!(wait_for(move || client2.aggregate(&event()).is_some()).await);
    // Give the second copy time to be routed and discarded
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let aggregate = client.aggregate(&event()).unwrap();
    assert_eq!(aggregate.feed.len(), 1);
    assert_eq!(aggregate.count(Sentiment::Positive), 1);
}

#[tokio::test]
async fn test_confirmation_preserves_feed_position() {
    let (transport, mut handles) = FakeTransport::new();
    let client = SyncClient::new(test_config(), transport, RecordingRest::new());

    client.connect("token").await.unwrap();
    let mut handle = handles.recv().await.unwrap();
    handle.expect_identify().await;
    client.join(event(), ChannelKind::Feed).await.unwrap();
    handle.recv().await;

    let first = SourceId::generate();
    let second = SourceId::generate();

    let server = async {
        let frame = handle.recv().await;
        let ClientMessage::SubmitFeedback(request) = frame else {
            panic!("expected submit-feedback, got {frame:?}");
        };
        handle
            .send(ServerMessage::FeedbackReceived {
                source_id: request.source_id,
            })
            .await;
        handle
    };

    let (ack, handle) = tokio::join!(
        client.submit_feedback(feedback_draft(&event(), "first", first)),
        server
    );
    ack.unwrap();

    // A different item arrives, then the confirmed echo of the first one
    handle
        .send(feedback_broadcast(&event(), second, "second", "neutral"))
        .await;
    handle
        .send(feedback_broadcast(&event(), first, "first", "positive"))
        .await;

    let client2 = Arc::clone(&client);
    assert!(
        wait_for(move || {
            let snapshot = client2.channel_snapshot(&event(), ChannelKind::Feed);
            snapshot.len() == 2 && snapshot[0].origin == Origin::ServerConfirmed
        })
        .await
    );

    // The echo replaced the optimistic copy in place, ahead of the newer item
    let snapshot = client.channel_snapshot(&event(), ChannelKind::Feed);
    assert_eq!(snapshot[0].source_id, first);
    assert_eq!(snapshot[1].source_id, second);
}

#[tokio::test]
async fn test_reconnect_replays_subscriptions_once() {
    let (transport, mut handles) = FakeTransport::new();
    let client = SyncClient::new(
        test_config(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        RecordingRest::new(),
    );

    client.connect("token").await.unwrap();
    let mut first_link = handles.recv().await.unwrap();
    first_link.expect_identify().await;

    client.join(event(), ChannelKind::Feed).await.unwrap();
    client.join(event(), ChannelKind::Feed).await.unwrap(); // second view, no wire frame
    assert!(matches!(first_link.recv().await, ClientMessage::JoinEvent { .. }));
    first_link.assert_silent().await;

    // Two transport-level failures, then a successful attempt
    transport.fail_next_connects(2);
    first_link.close();

    let mut second_link = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        handles.recv(),
    )
    .await
    .expect("reconnect did not complete")
    .unwrap();

    second_link.expect_identify().await;
    assert!(matches!(second_link.recv().await, ClientMessage::JoinEvent { .. }));
    // One recorded subscription, exactly one replayed join
    second_link.assert_silent().await;

    assert_eq!(transport.attempts(), 4); // initial + 2 failed + 1 successful
    let client2 = Arc::clone(&client);
    assert!(
        wait_for(move || {
            client2.subscription_phase(&event(), ChannelKind::Feed)
                == Some(SubscriptionPhase::Active)
        })
        .await
    );
}

#[tokio::test]
async fn test_heartbeat_silence_triggers_reconnect() {
    let (transport, mut handles) = FakeTransport::new();
    let mut config = test_config();
    config.heartbeat = HeartbeatConfig {
        timeout_ms: 100,
        check_interval_ms: 20,
    };
    let client = SyncClient::new(
        config,
        Arc::clone(&transport) as Arc<dyn Transport>,
        RecordingRest::new(),
    );

    client.connect("token").await.unwrap();
    let mut first_link = handles.recv().await.unwrap();
    first_link.expect_identify().await;
    client.join(event(), ChannelKind::Feed).await.unwrap();
    assert!(matches!(first_link.recv().await, ClientMessage::JoinEvent { .. }));

    // The first link stays open but the server never heartbeats; the watchdog
    // must treat the silence as a dead connection and open a fresh link.
    let mut second_link = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        handles.recv(),
    )
    .await
    .expect("heartbeat watchdog did not reconnect")
    .unwrap();

    assert_eq!(second_link.expect_identify().await, "token");
    assert!(matches!(second_link.recv().await, ClientMessage::JoinEvent { .. }));
    assert!(transport.attempts() >= 2);

    // Only now may the stale link go away
    first_link.close();
}

#[tokio::test]
async fn test_auth_rejection_is_not_retried() {
    let (transport, _handles) = FakeTransport::new();
    transport.reject_auth();
    let client = SyncClient::new(
        test_config(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        RecordingRest::new(),
    );

    let err = client.connect("bad-token").await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(transport.attempts(), 1);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_ack_timeout_is_per_operation() {
    let (transport, mut handles) = FakeTransport::new();
    let client = SyncClient::new(test_config(), transport, RecordingRest::new());

    client.connect("token").await.unwrap();
    let mut handle = handles.recv().await.unwrap();
    handle.expect_identify().await;

    let slow = SourceId::generate();
    let fast = SourceId::generate();

    let server = async {
        // Two operations in flight; only one is ever acknowledged
        handle.recv().await;
        handle.recv().await;
        handle
            .send(ServerMessage::FeedbackReceived { source_id: fast })
            .await;
        handle
    };

    let (slow_result, fast_result, _handle) = tokio::join!(
        client.submit_feedback(feedback_draft(&event(), "never acked", slow)),
        client.submit_feedback(feedback_draft(&event(), "acked", fast)),
        server
    );

    assert!(matches!(slow_result, Err(SyncError::Timeout { .. })));
    assert_eq!(fast_result.unwrap().via, AckVia::Transport);

    // Both optimistic copies survive; the timeout retracts nothing
    let snapshot = client.channel_snapshot(&event(), ChannelKind::Feed);
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn test_operations_fall_back_to_rest_while_offline() {
    let (transport, _handles) = FakeTransport::new();
    transport.fail_next_connects(u32::MAX);
    let rest = RecordingRest::new();
    let client = SyncClient::new(test_config(), transport, Arc::clone(&rest) as Arc<dyn RestApi>);

    assert!(client.connect("token").await.is_err());

    let source_id = SourceId::generate();
    let ack = client
        .submit_feedback(feedback_draft(&event(), "offline note", source_id))
        .await
        .unwrap();

    assert_eq!(ack.via, AckVia::Rest);
    assert_eq!(rest.feedback.lock().len(), 1);
    assert_eq!(rest.feedback.lock()[0].source_id, source_id);

    // The optimistic copy was admitted before the fallback dispatch
    let snapshot = client.channel_snapshot(&event(), ChannelKind::Feed);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].origin, Origin::LocalPending);
}

#[tokio::test]
async fn test_alert_resolution_decrements_active_count_once() {
    let (transport, mut handles) = FakeTransport::new();
    let client = SyncClient::new(test_config(), transport, RecordingRest::new());

    client.connect("token").await.unwrap();
    let mut handle = handles.recv().await.unwrap();
    handle.expect_identify().await;

    client.join(event(), ChannelKind::Alerts).await.unwrap();
    assert!(matches!(handle.recv().await, ClientMessage::SubscribeAlerts { .. }));

    handle
        .send(alert_broadcast(&event(), SourceId::generate(), "a1"))
        .await;

    let client2 = Arc::clone(&client);
    assert!(
        wait_for(move || {
            client2
                .aggregate(&event())
                .is_some_and(|a| a.active_alert_count == 1)
        })
        .await
    );

    let source_id = SourceId::generate();
    let server = async {
        let frame = handle.recv().await;
        assert!(matches!(frame, ClientMessage::UpdateAlert(_)));
        handle
            .send(ServerMessage::AlertUpdateConfirmed { source_id })
            .await;
        // Confirmed echo of the resolution under the same source ID
        handle
            .send(alert_update_broadcast(&event(), source_id, "a1", "resolved"))
            .await;
        handle
    };

    let (ack, _handle) = tokio::join!(
        client.update_alert(alert_change(&event(), "a1", AlertStatus::Resolved, source_id)),
        server
    );
    ack.unwrap();

    let client2 = Arc::clone(&client);
    assert!(
        wait_for(move || {
            client2.aggregate(&event()).is_some_and(|a| {
                a.active_alert_count == 0 && a.alerts[0].status == AlertStatus::Resolved
            })
        })
        .await
    );
}

#[tokio::test]
async fn test_malformed_broadcast_is_dropped_alone() {
    let (transport, mut handles) = FakeTransport::new();
    let client = SyncClient::new(test_config(), transport, RecordingRest::new());

    client.connect("token").await.unwrap();
    let mut handle = handles.recv().await.unwrap();
    handle.expect_identify().await;
    client.join(event(), ChannelKind::Feed).await.unwrap();
    handle.recv().await;

    // Unknown sentiment key fails only this one event
    handle
        .send(feedback_broadcast(&event(), SourceId::generate(), "odd", "ecstatic"))
        .await;
    handle
        .send(feedback_broadcast(&event(), SourceId::generate(), "fine", "neutral"))
        .await;

    let client2 = Arc::clone(&client);
    assert!(
        wait_for(move || {
            client2
                .aggregate(&event())
                .is_some_and(|a| a.count(Sentiment::Neutral) == 1)
        })
        .await
    );
    let aggregate = client.aggregate(&event()).unwrap();
    assert_eq!(aggregate.feed.len(), 1);
    assert_eq!(aggregate.feed[0].text, "fine");
}

#[tokio::test]
async fn test_refresh_merges_server_snapshot() {
    let (transport, _handles) = FakeTransport::new();
    let rest = RecordingRest::new();
    let client = SyncClient::new(test_config(), transport, Arc::clone(&rest) as Arc<dyn RestApi>);

    rest.set_snapshot(AggregateSnapshot {
        event_id: event(),
        sentiment_counts: HashMap::from([(Sentiment::Positive, 7), (Sentiment::Negative, 2)]),
        feed: Vec::new(),
        alerts: Vec::new(),
        active_alert_count: 0,
        fetched_at: Utc::now(),
    });

    client.refresh(&event()).await.unwrap();

    let aggregate = client.aggregate(&event()).unwrap();
    assert_eq!(aggregate.count(Sentiment::Positive), 7);
    assert_eq!(aggregate.count(Sentiment::Negative), 2);
    assert!(aggregate.last_refreshed_at.is_some());
}
