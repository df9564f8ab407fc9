//! Client/store wire protocol for the `TaskMirror` document collection.
//!
//! Defines the [`ClientRequest`] and [`ServerEvent`] enums that are
//! postcard-encoded and sent over WebSocket binary frames. The protocol is
//! snapshot-based: every change to the collection is pushed to each
//! subscriber as the *full* ordered document set, never a delta.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::doc::{DocId, TaskDoc, TaskDraft};

/// Correlation identifier for a write request and its acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The document field a subscription orders by.
///
/// `created_at` is the only orderable field in the task schema; the enum
/// keeps the wire contract explicit rather than encoding a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKey {
    /// Order by the server-assigned creation timestamp.
    CreatedAt,
}

/// Sort direction for an ordered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Oldest first.
    Ascending,
    /// Most recently created first.
    Descending,
}

/// Messages sent from a client to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Open a live subscription over the collection.
    ///
    /// The store replies immediately with a [`ServerEvent::Snapshot`] of
    /// the current state, then pushes a fresh snapshot after every change.
    Subscribe {
        /// Field to order the snapshot by.
        order_key: OrderKey,
        /// Sort direction.
        direction: SortDirection,
    },

    /// Stop snapshot delivery for this connection.
    ///
    /// Safe to send when no subscription is open; the store treats that
    /// as a no-op.
    Unsubscribe,

    /// Create a new document.
    ///
    /// The store acknowledges with [`ServerEvent::Ack`] carrying
    /// [`WriteOutcome::Added`] and the assigned [`DocId`].
    Add {
        /// Correlation id echoed back in the acknowledgment.
        request_id: RequestId,
        /// The document fields to persist.
        draft: TaskDraft,
    },

    /// Delete a document by identifier.
    ///
    /// Deleting an id that does not exist (or was already deleted) is
    /// acknowledged as a success; deletion is idempotent by contract.
    Delete {
        /// Correlation id echoed back in the acknowledgment.
        request_id: RequestId,
        /// The document to delete.
        id: DocId,
    },
}

/// Outcome of a write request, carried in [`ServerEvent::Ack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// The document was created with this store-assigned id.
    Added {
        /// Identifier of the new document.
        id: DocId,
    },
    /// The delete was applied (or the id was already absent).
    Deleted,
    /// The write was rejected by the store.
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
    },
}

/// Messages pushed from the store to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// The full ordered document set currently matching the subscription.
    ///
    /// Delivered once immediately after [`ClientRequest::Subscribe`] and
    /// again after every change to the collection.
    Snapshot {
        /// All documents, in subscription order.
        docs: Vec<TaskDoc>,
    },

    /// The subscription failed or was rejected.
    ///
    /// No further snapshots will be delivered on this connection until a
    /// new subscription is opened.
    SubscriptionError {
        /// Human-readable failure reason.
        reason: String,
    },

    /// Acknowledgment of a write request.
    Ack {
        /// Correlation id of the originating request.
        request_id: RequestId,
        /// What the store did with the write.
        outcome: WriteOutcome,
    },
}
