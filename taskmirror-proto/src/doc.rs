//! Document model for the `TaskMirror` ordered collection.
//!
//! A collection holds task documents with exactly two persisted fields:
//! free-form `text` and a server-assigned `created_at` timestamp. Document
//! identifiers are assigned by the store at creation time and are the sole
//! key for deletion and rendering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task text length in characters.
pub const MAX_TEXT_LENGTH: usize = 1024;

/// Unique identifier for a document, based on UUID v7 for time-ordering.
///
/// Assigned by the store when a document is created; clients treat it as
/// opaque. The v7 time component doubles as the store's tie-break when two
/// documents share a `created_at` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(Uuid);

impl DocId {
    /// Creates a new time-ordered document identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `DocId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A server-assigned creation timestamp, in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

/// A task document as it appears in a snapshot.
///
/// `created_at` is optional on the wire: a store may surface a document
/// whose server timestamp has not been resolved yet. Clients preserve the
/// absence and never substitute a clock value of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDoc {
    /// Store-assigned document identifier.
    pub id: DocId,
    /// Free-form task text.
    pub text: String,
    /// Server-assigned creation time, if already resolved.
    pub created_at: Option<Timestamp>,
}

/// The creation-time value carried on a write.
///
/// [`WriteTimestamp::Server`] is the marker the store replaces with its own
/// clock at write time. It is distinct from any client-computed value;
/// [`WriteTimestamp::At`] exists for stores that replay or import documents
/// with known timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteTimestamp {
    /// Substitute the server's clock at write time.
    Server,
    /// Use this explicit timestamp.
    At(Timestamp),
}

/// Fields for a document about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Free-form task text. Must be non-empty after trimming.
    pub text: String,
    /// Creation-time value; normally [`WriteTimestamp::Server`].
    pub created_at: WriteTimestamp,
}
