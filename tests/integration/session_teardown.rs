//! Integration tests for the session lifecycle.
//!
//! Verifies the state machine, idempotent teardown, the guard against late
//! snapshot delivery after unsubscribing, and the frozen-list behavior
//! after a subscription error.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskmirror::gateway::loopback::LoopbackGateway;
use taskmirror::sync::{SessionChange, SessionState, SyncError, SyncSession};
use taskmirror_proto::doc::{DocId, TaskDoc, Timestamp};

fn make_session() -> (Arc<LoopbackGateway>, SyncSession<LoopbackGateway>) {
    let gateway = Arc::new(LoopbackGateway::new());
    let session = SyncSession::new(Arc::clone(&gateway));
    (gateway, session)
}

fn doc(text: &str, ms: u64) -> TaskDoc {
    TaskDoc {
        id: DocId::new(),
        text: text.to_string(),
        created_at: Some(Timestamp::from_millis(ms)),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_passes_through_subscribing_before_synced() {
    let (_gateway, mut session) = make_session();
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.subscribe().await.expect("subscribe");
    assert_eq!(session.state(), SessionState::Subscribing);

    session.next_change().await;
    assert_eq!(session.state(), SessionState::Synced);
}

#[tokio::test]
async fn opening_a_second_subscription_is_a_misuse_error() {
    let (_gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");

    assert!(matches!(
        session.subscribe().await,
        Err(SyncError::AlreadySubscribed)
    ));
    // Still true once synced.
    session.next_change().await;
    assert!(matches!(
        session.subscribe().await,
        Err(SyncError::AlreadySubscribed)
    ));
}

#[tokio::test]
async fn subscribe_after_teardown_is_rejected() {
    let (_gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.teardown();

    assert!(matches!(session.subscribe().await, Err(SyncError::TornDown)));
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn teardown_is_idempotent() {
    let (_gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    session.teardown();
    assert_eq!(session.state(), SessionState::TornDown);
    // Second call: no panic, no error, still torn down.
    session.teardown();
    assert_eq!(session.state(), SessionState::TornDown);
}

#[tokio::test]
async fn teardown_before_subscribe_is_harmless() {
    let (_gateway, mut session) = make_session();
    session.teardown();
    assert_eq!(session.state(), SessionState::TornDown);
}

#[tokio::test]
async fn snapshots_after_teardown_are_not_applied() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway.emit_snapshot(vec![doc("before teardown", 1)]).await;
    session.next_change().await;
    assert_eq!(session.tasks().len(), 1);

    session.teardown();

    // Deliveries on the old channel go nowhere.
    gateway.emit_snapshot(vec![doc("late", 2), doc("later", 3)]).await;
    assert_eq!(session.next_change().await, SessionChange::Closed);
    let tasks = session.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "before teardown");
}

#[tokio::test]
async fn buffered_snapshot_is_discarded_by_teardown() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    // Delivered into the channel but never consumed before teardown.
    gateway.emit_snapshot(vec![doc("in flight", 1)]).await;
    session.teardown();

    assert_eq!(session.next_change().await, SessionChange::Closed);
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn mutations_after_teardown_are_rejected() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.teardown();

    session.set_pending_input("too late");
    assert!(matches!(
        session.submit_task().await,
        Err(SyncError::TornDown)
    ));
    assert!(matches!(
        session.delete_task(&DocId::new()).await,
        Err(SyncError::TornDown)
    ));
    assert_eq!(gateway.add_calls().await, 0);
    assert_eq!(gateway.delete_calls().await, 0);
}

// ---------------------------------------------------------------------------
// Subscription errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscription_error_freezes_the_list_and_faults_the_session() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway.emit_snapshot(vec![doc("last known good", 1)]).await;
    session.next_change().await;

    gateway.emit_error("collection unavailable").await;
    match session.next_change().await {
        SessionChange::SubscriptionLost { reason } => {
            assert!(reason.contains("collection unavailable"));
        }
        other => panic!("expected SubscriptionLost, got {other:?}"),
    }

    assert_eq!(session.state(), SessionState::Faulted);
    let tasks = session.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "last known good");
}

#[tokio::test]
async fn faulted_session_remains_usable_for_mutations() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway.emit_error("channel failure").await;
    session.next_change().await;
    assert_eq!(session.state(), SessionState::Faulted);

    // Writes still reach the store; their effects would surface on a
    // future session's first snapshot.
    session.set_pending_input("written while faulted");
    session.submit_task().await.expect("submit");
    assert_eq!(gateway.doc_count().await, 1);

    // But this session never resubscribes on its own.
    assert!(matches!(session.subscribe().await, Err(SyncError::Faulted)));
}

#[tokio::test]
async fn error_is_reported_once_then_the_stream_ends() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway.emit_error("boom").await;
    assert!(matches!(
        session.next_change().await,
        SessionChange::SubscriptionLost { .. }
    ));
    // Subsequent polls observe a closed stream, not repeated errors.
    assert_eq!(session.next_change().await, SessionChange::Closed);
    assert_eq!(session.next_change().await, SessionChange::Closed);
}

#[tokio::test]
async fn rejected_subscribe_requires_a_new_session() {
    let (gateway, mut session) = make_session();
    gateway.set_reject_subscriptions(Some("not today")).await;

    assert!(session.subscribe().await.is_err());
    assert_eq!(session.state(), SessionState::Faulted);

    // The replacement session works once the store accepts again.
    gateway.set_reject_subscriptions(None).await;
    let mut replacement = SyncSession::new(Arc::clone(&gateway));
    replacement.subscribe().await.expect("subscribe");
    replacement.next_change().await;
    assert_eq!(replacement.state(), SessionState::Synced);
}
