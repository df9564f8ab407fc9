//! The authoritative ordered document collection.
//!
//! Holds the task documents, assigns identifiers, and resolves the
//! server-timestamp marker with a strictly monotonic millisecond clock so
//! that creation order is always reflected in `created_at`. Deletion is
//! idempotent: removing an absent id reports "nothing changed" rather than
//! an error.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;

use taskmirror_proto::doc::{
    DocId, MAX_TEXT_LENGTH, TaskDoc, TaskDraft, Timestamp, WriteTimestamp,
};
use taskmirror_proto::wire::{OrderKey, SortDirection};

/// Errors that can reject a write.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    /// Task text cannot be empty after trimming.
    #[error("task text cannot be empty")]
    TextEmpty,
    /// Task text exceeds the maximum length.
    #[error("task text too long (max {MAX_TEXT_LENGTH} characters)")]
    TextTooLong,
}

/// A document held by the collection.
#[derive(Debug, Clone)]
struct StoredDoc {
    id: DocId,
    text: String,
    created_at: Timestamp,
}

/// Mutable collection state behind the lock.
#[derive(Default)]
struct CollectionInner {
    docs: Vec<StoredDoc>,
    clock_ms: u64,
}

impl CollectionInner {
    /// Returns a strictly monotonic server timestamp: never behind the wall
    /// clock and never at-or-behind a previously issued value.
    fn next_timestamp(&mut self) -> Timestamp {
        self.clock_ms = self.clock_ms.saturating_add(1).max(now_ms());
        Timestamp::from_millis(self.clock_ms)
    }
}

/// Returns the current time in milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// The ordered task document collection. Thread-safe via [`RwLock`].
#[derive(Default)]
pub struct Collection {
    inner: RwLock<CollectionInner>,
}

impl Collection {
    /// Creates a new, empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document, assigning its id and resolving the timestamp.
    ///
    /// The single schema rule lives here: a document must carry non-empty
    /// text (after trimming) of at most [`MAX_TEXT_LENGTH`] characters. The
    /// text itself is persisted untrimmed.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if the text violates the schema rule.
    pub async fn insert(&self, draft: &TaskDraft) -> Result<DocId, WriteError> {
        if draft.text.trim().is_empty() {
            return Err(WriteError::TextEmpty);
        }
        if draft.text.chars().count() > MAX_TEXT_LENGTH {
            return Err(WriteError::TextTooLong);
        }

        let mut inner = self.inner.write().await;
        let created_at = match draft.created_at {
            WriteTimestamp::Server => inner.next_timestamp(),
            WriteTimestamp::At(ts) => {
                // Keep the clock ahead of explicit values so later
                // server-resolved writes still sort after this one.
                inner.clock_ms = inner.clock_ms.max(ts.as_millis());
                ts
            }
        };
        let id = DocId::new();
        inner.docs.push(StoredDoc {
            id: id.clone(),
            text: draft.text.clone(),
            created_at,
        });
        Ok(id)
    }

    /// Removes a document by id. Returns whether anything changed; an
    /// absent id is a successful no-op.
    pub async fn remove(&self, id: &DocId) -> bool {
        let mut inner = self.inner.write().await;
        let before = inner.docs.len();
        inner.docs.retain(|d| d.id != *id);
        inner.docs.len() != before
    }

    /// Projects the collection in the requested order.
    ///
    /// Ties on `created_at` break by document id; clients treat the
    /// resulting position as opaque and never re-derive it.
    pub async fn snapshot(&self, _key: OrderKey, direction: SortDirection) -> Vec<TaskDoc> {
        let inner = self.inner.read().await;
        let mut sorted: Vec<&StoredDoc> = inner.docs.iter().collect();
        sorted.sort_by(|a, b| {
            let ord = a
                .created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id));
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
        sorted
            .into_iter()
            .map(|d| TaskDoc {
                id: d.id.clone(),
                text: d.text.clone(),
                created_at: Some(d.created_at),
            })
            .collect()
    }

    /// Number of documents currently held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.docs.len()
    }

    /// Whether the collection holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
