//! Integration tests for the mutation API.
//!
//! Verifies validation skips, the absence of any optimistic local echo for
//! both submit and delete, and the failure paths (pending input preserved,
//! list untouched, session still usable).

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskmirror::gateway::loopback::LoopbackGateway;
use taskmirror::sync::{SessionChange, SubmitOutcome, SyncSession};
use taskmirror_proto::doc::DocId;

fn make_session() -> (Arc<LoopbackGateway>, SyncSession<LoopbackGateway>) {
    let gateway = Arc::new(LoopbackGateway::new());
    let session = SyncSession::new(Arc::clone(&gateway));
    (gateway, session)
}

/// Subscribes and consumes the initial snapshot.
async fn synced_session() -> (Arc<LoopbackGateway>, SyncSession<LoopbackGateway>) {
    let (gateway, mut session) = make_session();
    session.subscribe().await.expect("subscribe");
    session.next_change().await;
    (gateway, session)
}

// ---------------------------------------------------------------------------
// Validation skip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_and_whitespace_submissions_never_reach_the_gateway() {
    let (gateway, mut session) = synced_session().await;

    for text in ["", "  ", " \t \n "] {
        session.set_pending_input(text);
        assert_eq!(
            session.submit_task().await.expect("skip is not an error"),
            SubmitOutcome::SkippedEmpty
        );
    }

    assert_eq!(gateway.add_calls().await, 0);
    assert!(session.tasks().is_empty());
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_sends_text_and_clears_pending_input() {
    let (gateway, mut session) = synced_session().await;

    session.set_pending_input("Buy milk");
    let outcome = session.submit_task().await.expect("submit");
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    assert_eq!(session.pending_input(), "");
    assert_eq!(gateway.add_calls().await, 1);
}

#[tokio::test]
async fn list_is_unchanged_until_the_snapshot_arrives() {
    let (_gateway, mut session) = synced_session().await;

    session.set_pending_input("Buy milk");
    session.submit_task().await.expect("submit");

    // The add has been acknowledged, but no snapshot was consumed yet:
    // nothing may appear in the mirrored list.
    assert!(session.tasks().is_empty());

    assert_eq!(session.next_change().await, SessionChange::ListReplaced);
    let tasks = session.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Buy milk");
    assert!(tasks[0].created_at.is_some());
}

#[tokio::test]
async fn failed_submit_preserves_pending_input_and_list() {
    let (gateway, mut session) = synced_session().await;
    gateway.set_fail_writes(Some("store offline")).await;

    session.set_pending_input("keep me");
    assert!(session.submit_task().await.is_err());
    assert_eq!(session.pending_input(), "keep me");
    assert!(session.tasks().is_empty());

    // The failure is terminal for that operation only: a manual retry on
    // the same session succeeds once the store recovers.
    gateway.set_fail_writes(None).await;
    let outcome = session.submit_task().await.expect("retry");
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    assert_eq!(session.pending_input(), "");
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_is_never_applied_optimistically() {
    let (gateway, mut session) = synced_session().await;

    session.set_pending_input("doomed");
    session.submit_task().await.expect("submit");
    session.next_change().await;
    let id = session.tasks()[0].id.clone();

    session.delete_task(&id).await.expect("delete");
    assert_eq!(gateway.delete_calls().await, 1);
    // Still present: removal only becomes visible via the next snapshot.
    assert_eq!(session.tasks().len(), 1);

    assert_eq!(session.next_change().await, SessionChange::ListReplaced);
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn deleting_an_unknown_id_is_a_noop_success() {
    let (gateway, mut session) = synced_session().await;

    session.delete_task(&DocId::new()).await.expect("delete");
    assert_eq!(gateway.delete_calls().await, 1);
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn failed_delete_needs_no_local_reversal() {
    let (gateway, mut session) = synced_session().await;

    session.set_pending_input("survivor");
    session.submit_task().await.expect("submit");
    session.next_change().await;
    let id = session.tasks()[0].id.clone();

    gateway.set_fail_writes(Some("store offline")).await;
    assert!(session.delete_task(&id).await.is_err());
    // Nothing was removed locally, so nothing needs restoring.
    assert_eq!(session.tasks().len(), 1);
    assert_eq!(gateway.doc_count().await, 1);
}

// ---------------------------------------------------------------------------
// End-to-end scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_then_delete_round_trip() {
    let (gateway, mut session) = synced_session().await;
    assert!(session.tasks().is_empty());

    session.set_pending_input("A");
    session.submit_task().await.expect("submit");
    assert_eq!(gateway.add_calls().await, 1);

    session.next_change().await;
    let tasks = session.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "A");

    let id = tasks[0].id.clone();
    session.delete_task(&id).await.expect("delete");
    assert_eq!(gateway.delete_calls().await, 1);

    session.next_change().await;
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn add_delete_race_resolves_to_last_snapshot() {
    let (gateway, mut session) = synced_session().await;

    // A second actor creates and immediately deletes a task before this
    // session consumes any of the intervening snapshots.
    let writer = (*gateway).clone();
    use taskmirror::gateway::Gateway as _;
    let id = writer
        .add(taskmirror_proto::doc::TaskDraft {
            text: "here and gone".to_string(),
            created_at: writer.server_timestamp_marker(),
        })
        .await
        .expect("add");
    writer.delete_by_id(&id).await.expect("delete");

    // Last snapshot wins: after draining, the list is empty.
    session.next_change().await;
    session.next_change().await;
    assert!(session.tasks().is_empty());
}
