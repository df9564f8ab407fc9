//! Gateway abstraction over the remote ordered document collection.
//!
//! Defines the [`Gateway`] trait that all gateway implementations must satisfy.
//! Concrete implementations include:
//! - [`loopback::LoopbackGateway`] — in-process collection for testing and offline use
//! - [`remote::RemoteGateway`] — WebSocket connection to a `taskmirror-store` server
//!
//! The gateway is a capability: open a live subscription over the collection,
//! add a document, delete a document by id, and obtain the server-timestamp
//! marker. The sync core depends on this contract and nothing else about the
//! remote store.

pub mod loopback;
pub mod remote;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use taskmirror_proto::doc::{DocId, TaskDoc, TaskDraft, WriteTimestamp};
use taskmirror_proto::wire::{OrderKey, SortDirection};

/// Errors that can occur during gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The store refused to open the subscription.
    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),

    /// A live subscription is already open on this gateway connection.
    #[error("a live subscription is already open")]
    SubscriptionActive,

    /// The store refused a write (add or delete).
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// The connection to the store has been closed.
    #[error("gateway connection closed")]
    ConnectionClosed,

    /// The operation timed out before the store acknowledged it.
    #[error("gateway operation timed out")]
    Timeout,

    /// The gateway URL could not be parsed or is not a WebSocket URL.
    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),

    /// An underlying I/O error occurred.
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An event delivered on a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// The full ordered document set after a change (or the initial state).
    Snapshot(Vec<TaskDoc>),
    /// The live channel failed; no further snapshots will be delivered.
    Error(String),
}

/// The consumer half of a live subscription.
///
/// Snapshots and errors are delivered in the order the gateway emits them,
/// never reordered or coalesced. [`Subscription::unsubscribe`] is idempotent
/// and safe to call after an error; once called, no further events are
/// observable even if they were already in flight. Dropping the handle
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<SubscriptionEvent>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Creates a connected feed/subscription pair.
    ///
    /// Gateway implementations hold the [`SubscriptionFeed`] and push events
    /// into it; the subscriber awaits them on the returned `Subscription`.
    #[must_use]
    pub fn channel(buffer: usize) -> (SubscriptionFeed, Subscription) {
        let (tx, rx) = mpsc::channel(buffer);
        let active = Arc::new(AtomicBool::new(true));
        (
            SubscriptionFeed {
                tx,
                active: Arc::clone(&active),
            },
            Subscription { events: rx, active },
        )
    }

    /// Awaits the next snapshot or error.
    ///
    /// Returns `None` once the subscription has been cancelled or the
    /// producing side has gone away.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }
        self.events.recv().await
    }

    /// Stops event delivery. Idempotent.
    ///
    /// Events already buffered but not yet observed are discarded; late
    /// deliveries from the producer are dropped at the feed.
    pub fn unsubscribe(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.events.close();
        }
    }

    /// Returns whether the subscription is still accepting events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// The producer half of a live subscription, held by gateway implementations.
#[derive(Debug)]
pub struct SubscriptionFeed {
    tx: mpsc::Sender<SubscriptionEvent>,
    active: Arc<AtomicBool>,
}

impl SubscriptionFeed {
    /// Returns whether the subscriber can still observe events.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Delivers an event to the subscriber.
    ///
    /// Returns `false` if the subscriber unsubscribed or was dropped; the
    /// event is discarded in that case.
    pub async fn push(&self, event: SubscriptionEvent) -> bool {
        if !self.is_open() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }
}

/// Async capability trait for the remote ordered document collection.
///
/// Writes are observed only through the subscription channel: neither `add`
/// nor `delete_by_id` implies any local state change for the caller, and the
/// snapshot reflecting a write may arrive before, concurrently with, or after
/// the write call returns.
pub trait Gateway: Send + Sync {
    /// Opens a live, push-based subscription over the collection.
    ///
    /// The first event is a snapshot of the current state; every subsequent
    /// change to the collection delivers a fresh full snapshot in the
    /// requested order.
    fn subscribe(
        &self,
        order_key: OrderKey,
        direction: SortDirection,
    ) -> impl std::future::Future<Output = Result<Subscription, GatewayError>> + Send;

    /// Creates a new document and returns its store-assigned identifier.
    ///
    /// The returned id is for correlation only — rendering happens via the
    /// next subscription snapshot.
    fn add(
        &self,
        draft: TaskDraft,
    ) -> impl std::future::Future<Output = Result<DocId, GatewayError>> + Send;

    /// Deletes a document by identifier.
    ///
    /// Deleting an id that does not exist (or was already deleted) succeeds;
    /// deletion is idempotent by contract.
    fn delete_by_id(
        &self,
        id: &DocId,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Returns the marker the store resolves to its own clock at write time.
    fn server_timestamp_marker(&self) -> WriteTimestamp;
}
