//! The synchronization core: subscription lifecycle, the mirrored task
//! list, and the mutation API consumed by the presentation layer.
//!
//! A [`SyncSession`] mirrors the remote collection through exactly one live
//! subscription. Every inbound snapshot replaces the local list wholesale —
//! there is deliberately no diff or merge path, because each snapshot is
//! already the total ordered state. Mutations go to the gateway and are
//! never echoed locally; their effects become visible only when the gateway
//! pushes the next snapshot.

use std::sync::Arc;

use taskmirror_proto::doc::{DocId, TaskDoc, TaskDraft, Timestamp};
use taskmirror_proto::wire::{OrderKey, SortDirection};

use crate::gateway::{Gateway, GatewayError, Subscription, SubscriptionEvent};

/// A task record mirrored from the remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Gateway-assigned identifier; the sole key for deletion and rendering.
    pub id: DocId,
    /// User-supplied task text.
    pub text: String,
    /// Server-assigned creation time; absent until the store has resolved it.
    pub created_at: Option<Timestamp>,
}

impl From<TaskDoc> for Task {
    fn from(doc: TaskDoc) -> Self {
        Self {
            id: doc.id,
            text: doc.text,
            created_at: doc.created_at,
        }
    }
}

/// Lifecycle state of a session.
///
/// `Uninitialized → Subscribing → Synced ⇄ Faulted`, with `TornDown` as the
/// only terminal state, reached by explicit [`SyncSession::teardown`]. A
/// session always passes through `Subscribing` before reaching `Synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no subscription opened yet.
    Uninitialized,
    /// Subscription requested, awaiting the initial snapshot.
    Subscribing,
    /// Mirroring live snapshots.
    Synced,
    /// The subscription failed; the list is frozen at last-known-good state.
    /// Mutations remain usable. Resubscribing requires a new session.
    Faulted,
    /// Torn down; the subscription handle has been released.
    TornDown,
}

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A subscription was already opened on this session.
    #[error("session already holds a subscription")]
    AlreadySubscribed,

    /// The session's subscription failed earlier; start a new session.
    #[error("session is faulted; start a new session to resubscribe")]
    Faulted,

    /// The session has been torn down.
    #[error("session is torn down")]
    TornDown,

    /// The gateway refused or failed the operation.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// What [`SyncSession::next_change`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// A snapshot arrived and the mirrored list was replaced.
    ListReplaced,
    /// The subscription failed; the list is frozen and will not change again
    /// on this session.
    SubscriptionLost {
        /// Why the channel failed.
        reason: String,
    },
    /// The subscription ended without a further event (torn down locally or
    /// the gateway went away silently).
    Closed,
}

/// Result of a [`SyncSession::submit_task`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The gateway accepted the document; the id is for correlation only.
    Submitted(DocId),
    /// The pending text was empty after trimming; nothing was sent.
    SkippedEmpty,
}

/// Owns the subscription lifecycle, the mirrored list, and pending input.
///
/// The session is single-owner: one logical thread of control drives it,
/// alternating between [`next_change`](Self::next_change) (the lone
/// suspension point) and mutation calls. Readers get the list as a stable
/// [`Arc`] reference that is swapped, never mutated in place.
pub struct SyncSession<G> {
    gateway: Arc<G>,
    state: SessionState,
    tasks: Arc<[Task]>,
    pending_input: String,
    subscription: Option<Subscription>,
}

impl<G: Gateway> SyncSession<G> {
    /// Creates a session over the given gateway. No subscription is opened
    /// until [`subscribe`](Self::subscribe) is called.
    #[must_use]
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            state: SessionState::Uninitialized,
            tasks: Arc::new([]),
            pending_input: String::new(),
            subscription: None,
        }
    }

    /// Opens the live subscription, ordered by creation time descending.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadySubscribed`] if this session already opened one
    ///   (at most one subscription handle per session).
    /// - [`SyncError::Faulted`] / [`SyncError::TornDown`] per session state.
    /// - [`SyncError::Gateway`] if the store rejects the subscription; the
    ///   session transitions to `Faulted` and must be replaced to retry.
    pub async fn subscribe(&mut self) -> Result<(), SyncError> {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::TornDown => return Err(SyncError::TornDown),
            SessionState::Faulted => return Err(SyncError::Faulted),
            SessionState::Subscribing | SessionState::Synced => {
                return Err(SyncError::AlreadySubscribed);
            }
        }

        self.state = SessionState::Subscribing;
        match self
            .gateway
            .subscribe(OrderKey::CreatedAt, SortDirection::Descending)
            .await
        {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Faulted;
                tracing::warn!(error = %e, "subscription could not be established");
                Err(SyncError::Gateway(e))
            }
        }
    }

    /// Awaits the next snapshot or subscription error and folds it in.
    ///
    /// A snapshot atomically replaces the mirrored list, preserving the
    /// snapshot's order 1:1. An error freezes the list, is reported once,
    /// and moves the session to `Faulted`; there is no automatic
    /// resubscription. Once the subscription has ended, returns
    /// [`SessionChange::Closed`] immediately.
    pub async fn next_change(&mut self) -> SessionChange {
        let event = match self.subscription.as_mut() {
            Some(subscription) => subscription.next_event().await,
            None => return SessionChange::Closed,
        };

        match event {
            Some(SubscriptionEvent::Snapshot(docs)) => {
                self.tasks = docs.into_iter().map(Task::from).collect();
                if self.state == SessionState::Subscribing {
                    self.state = SessionState::Synced;
                }
                SessionChange::ListReplaced
            }
            Some(SubscriptionEvent::Error(reason)) => {
                self.state = SessionState::Faulted;
                tracing::warn!(%reason, "subscription failed; list frozen at last snapshot");
                SessionChange::SubscriptionLost { reason }
            }
            None => {
                // Nothing more can arrive; release the dead handle.
                self.subscription = None;
                SessionChange::Closed
            }
        }
    }

    /// Submits the pending input as a new task.
    ///
    /// Empty or whitespace-only input is a silent no-op: no gateway call, no
    /// state change, nothing reported. Otherwise the untrimmed text is sent
    /// with the server-timestamp marker; the pending input is cleared only
    /// on success, so a failed submission can be retried by the user. The
    /// mirrored list is never touched here — the new task appears when the
    /// gateway pushes the next snapshot.
    ///
    /// # Errors
    ///
    /// [`SyncError::TornDown`] after teardown, or [`SyncError::Gateway`] if
    /// the add fails (pending input is preserved).
    pub async fn submit_task(&mut self) -> Result<SubmitOutcome, SyncError> {
        if self.state == SessionState::TornDown {
            return Err(SyncError::TornDown);
        }
        if self.pending_input.trim().is_empty() {
            return Ok(SubmitOutcome::SkippedEmpty);
        }

        let draft = TaskDraft {
            text: self.pending_input.clone(),
            created_at: self.gateway.server_timestamp_marker(),
        };
        let id = self.gateway.add(draft).await.map_err(|e| {
            tracing::warn!(error = %e, "add failed; pending input preserved");
            e
        })?;
        self.pending_input.clear();
        Ok(SubmitOutcome::Submitted(id))
    }

    /// Requests deletion of the task with the given id.
    ///
    /// The local list is not updated — removal becomes visible on the next
    /// snapshot. Deleting an id the store no longer has is a success.
    ///
    /// # Errors
    ///
    /// [`SyncError::TornDown`] after teardown, or [`SyncError::Gateway`] if
    /// the delete fails.
    pub async fn delete_task(&mut self, id: &DocId) -> Result<(), SyncError> {
        if self.state == SessionState::TornDown {
            return Err(SyncError::TornDown);
        }
        self.gateway.delete_by_id(id).await.map_err(|e| {
            tracing::warn!(error = %e, task_id = %id, "delete failed");
            SyncError::Gateway(e)
        })
    }

    /// Releases the subscription and ends the session. Idempotent: calling
    /// again is a no-op and triggers no cleanup twice. Snapshots delivered
    /// after teardown are unobservable.
    pub fn teardown(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.state = SessionState::TornDown;
        tracing::debug!("session torn down");
    }

    /// Read-only snapshot of the mirrored list, most recently created first.
    ///
    /// The returned reference is stable: it points at the list as of the
    /// latest snapshot and is never mutated, only replaced.
    #[must_use]
    pub fn tasks(&self) -> Arc<[Task]> {
        Arc::clone(&self.tasks)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still has a live subscription to await.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
            && matches!(
                self.state,
                SessionState::Subscribing | SessionState::Synced
            )
    }

    /// Replaces the pending input text.
    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending_input = text.into();
    }

    /// The text a submit would send.
    #[must_use]
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }
}
