//! Integration tests for snapshot mirroring.
//!
//! Verifies that the mirrored list is always a 1:1, order-preserving
//! projection of the most recently delivered snapshot — a full replacement,
//! never a merge of two snapshots.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskmirror::gateway::loopback::LoopbackGateway;
use taskmirror::sync::{SessionChange, SessionState, SyncSession};
use taskmirror_proto::doc::{DocId, TaskDoc, Timestamp};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Creates a session over a fresh loopback collection.
fn make_session() -> (Arc<LoopbackGateway>, SyncSession<LoopbackGateway>) {
    let gateway = Arc::new(LoopbackGateway::new());
    let session = SyncSession::new(Arc::clone(&gateway));
    (gateway, session)
}

/// Builds a raw snapshot document.
fn doc(text: &str, created_at: Option<u64>) -> TaskDoc {
    TaskDoc {
        id: DocId::new(),
        text: text.to_string(),
        created_at: created_at.map(Timestamp::from_millis),
    }
}

// ---------------------------------------------------------------------------
// Snapshot projection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initial_snapshot_of_empty_collection_yields_empty_list() {
    let (_gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");

    assert_eq!(session.next_change().await, SessionChange::ListReplaced);
    assert!(session.tasks().is_empty());
    assert_eq!(session.state(), SessionState::Synced);
}

#[tokio::test]
async fn list_maps_snapshot_one_to_one_in_order() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    let docs = vec![
        doc("newest", Some(3000)),
        doc("middle", Some(2000)),
        doc("oldest", Some(1000)),
    ];
    gateway.emit_snapshot(docs.clone()).await;
    assert_eq!(session.next_change().await, SessionChange::ListReplaced);

    let tasks = session.tasks();
    assert_eq!(tasks.len(), docs.len());
    for (task, doc) in tasks.iter().zip(&docs) {
        assert_eq!(task.id, doc.id);
        assert_eq!(task.text, doc.text);
        assert_eq!(task.created_at, doc.created_at);
    }
}

#[tokio::test]
async fn each_snapshot_fully_replaces_the_previous_list() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway
        .emit_snapshot(vec![doc("a", Some(1)), doc("b", Some(2)), doc("c", Some(3))])
        .await;
    session.next_change().await;
    assert_eq!(session.tasks().len(), 3);

    // A smaller snapshot must not be merged with the previous one.
    let survivor = doc("only survivor", Some(9));
    gateway.emit_snapshot(vec![survivor.clone()]).await;
    session.next_change().await;

    let tasks = session.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, survivor.id);
}

#[tokio::test]
async fn snapshots_are_applied_in_delivery_order_without_coalescing() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway.emit_snapshot(vec![doc("first", Some(1))]).await;
    gateway.emit_snapshot(vec![doc("second", Some(2))]).await;
    gateway.emit_snapshot(vec![]).await;

    session.next_change().await;
    assert_eq!(session.tasks()[0].text, "first");
    session.next_change().await;
    assert_eq!(session.tasks()[0].text, "second");
    session.next_change().await;
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn unresolved_timestamps_are_preserved_as_absent() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway
        .emit_snapshot(vec![doc("just created", None), doc("settled", Some(100))])
        .await;
    session.next_change().await;

    let tasks = session.tasks();
    assert_eq!(tasks[0].created_at, None);
    assert_eq!(tasks[1].created_at, Some(Timestamp::from_millis(100)));
}

#[tokio::test]
async fn gateway_writes_flow_back_as_descending_snapshots() {
    use taskmirror::gateway::Gateway as _;
    use taskmirror_proto::doc::TaskDraft;

    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    // Another actor mutates the collection; this session only observes.
    let writer = (*gateway).clone();
    for text in ["first", "second", "third"] {
        writer
            .add(TaskDraft {
                text: text.to_string(),
                created_at: writer.server_timestamp_marker(),
            })
            .await
            .expect("add");
        session.next_change().await;
    }

    let tasks = session.tasks();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].text, "third");
    assert_eq!(tasks[1].text, "second");
    assert_eq!(tasks[2].text, "first");
    // Ids are unique within the list.
    let mut ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn stable_reference_survives_later_replacements() {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;

    gateway.emit_snapshot(vec![doc("v1", Some(1))]).await;
    session.next_change().await;
    let held = session.tasks();

    gateway.emit_snapshot(vec![doc("v2", Some(2))]).await;
    session.next_change().await;

    // The previously handed out reference still shows the old state;
    // the session now shows the new one.
    assert_eq!(held[0].text, "v1");
    assert_eq!(session.tasks()[0].text, "v2");
}
