//! Bridge between the poll-based TUI loop and the async sync core.
//!
//! Spawns a background tokio task that owns the [`SyncSession`] and
//! communicates with the main thread via [`SyncCommand`] / [`SyncEvent`]
//! channels.
//!
//! # Architecture
//!
//! ```text
//! TUI (main thread)  ←── SyncEvent ───  sync driver task
//!                     ─── SyncCommand →
//! ```
//!
//! The driver serializes snapshot application and mutation calls in one
//! logical thread: it `select!`s between the next subscription change and
//! the next command, so the mirrored list is only ever touched from here.

use std::sync::Arc;

use tokio::sync::mpsc;

use taskmirror_proto::doc::DocId;

use crate::gateway::Gateway;
use crate::sync::{SessionChange, SubmitOutcome, SyncError, SyncSession, Task};

/// Default channel capacity for commands and events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Commands sent from the TUI main loop to the sync driver.
#[derive(Debug)]
pub enum SyncCommand {
    /// Submit the given text as a new task.
    SubmitTask {
        /// The raw input text (validated by the core, sent untrimmed).
        text: String,
    },
    /// Delete the task with the given id.
    DeleteTask {
        /// Identifier of the task to delete.
        id: DocId,
    },
    /// Tear the session down and stop the driver.
    Shutdown,
}

/// Events sent from the sync driver to the TUI main loop.
#[derive(Debug)]
pub enum SyncEvent {
    /// A snapshot arrived; this is the complete new list.
    ListChanged {
        /// The mirrored list, most recently created first.
        tasks: Arc<[Task]>,
    },
    /// A submitted task was accepted; the input box can be cleared.
    InputAccepted,
    /// A submit failed; the input text should be kept for manual retry.
    SubmitFailed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// A delete failed. No local state needs reverting — the deletion was
    /// never applied optimistically.
    DeleteFailed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The subscription failed; the list shown is frozen at its last state.
    SubscriptionLost {
        /// Why the channel failed.
        reason: String,
    },
    /// The session ended (shutdown or the subscription closed silently).
    Closed,
}

/// Opens a session over `gateway`, subscribes, and spawns the driver task.
///
/// Returns the command sender and event receiver for the TUI loop. The
/// first event is the `ListChanged` for the initial snapshot.
///
/// # Errors
///
/// Returns [`SyncError`] if the subscription cannot be established; no
/// task is spawned in that case.
pub async fn spawn_sync<G>(
    gateway: Arc<G>,
    capacity: usize,
) -> Result<(mpsc::Sender<SyncCommand>, mpsc::Receiver<SyncEvent>), SyncError>
where
    G: Gateway + 'static,
{
    let mut session = SyncSession::new(gateway);
    session.subscribe().await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (evt_tx, evt_rx) = mpsc::channel(capacity);

    tokio::spawn(drive(session, cmd_rx, evt_tx));

    Ok((cmd_tx, evt_rx))
}

/// Driver loop: owns the session until shutdown.
async fn drive<G: Gateway>(
    mut session: SyncSession<G>,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    evt_tx: mpsc::Sender<SyncEvent>,
) {
    loop {
        tokio::select! {
            change = session.next_change(), if session.is_live() => {
                let event = match change {
                    SessionChange::ListReplaced => SyncEvent::ListChanged {
                        tasks: session.tasks(),
                    },
                    SessionChange::SubscriptionLost { reason } => {
                        SyncEvent::SubscriptionLost { reason }
                    }
                    SessionChange::Closed => SyncEvent::Closed,
                };
                if evt_tx.send(event).await.is_err() {
                    // TUI dropped; nothing left to serve.
                    session.teardown();
                    return;
                }
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(SyncCommand::SubmitTask { text }) => {
                    session.set_pending_input(text);
                    let event = match session.submit_task().await {
                        Ok(SubmitOutcome::Submitted(_)) => Some(SyncEvent::InputAccepted),
                        // Validation skip: silent, not an error.
                        Ok(SubmitOutcome::SkippedEmpty) => None,
                        Err(e) => Some(SyncEvent::SubmitFailed {
                            reason: e.to_string(),
                        }),
                    };
                    if let Some(event) = event
                        && evt_tx.send(event).await.is_err()
                    {
                        session.teardown();
                        return;
                    }
                }
                Some(SyncCommand::DeleteTask { id }) => {
                    if let Err(e) = session.delete_task(&id).await
                        && evt_tx
                            .send(SyncEvent::DeleteFailed {
                                reason: e.to_string(),
                            })
                            .await
                            .is_err()
                    {
                        session.teardown();
                        return;
                    }
                }
                Some(SyncCommand::Shutdown) | None => {
                    tracing::info!("sync driver shutting down");
                    session.teardown();
                    let _ = evt_tx.send(SyncEvent::Closed).await;
                    return;
                }
            }
        }
    }
}
