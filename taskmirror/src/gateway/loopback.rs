//! Loopback gateway for testing and offline development.
//!
//! Holds the ordered collection in process and implements the same
//! observable contract as a remote store: server-assigned ids, a strictly
//! monotonic server clock resolving the timestamp marker, and a fresh full
//! snapshot broadcast to every subscriber after each accepted write.
//!
//! Cloning a `LoopbackGateway` shares the underlying collection, so a test
//! can mutate the store through one handle while a session observes it
//! through another.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use taskmirror_proto::doc::{
    DocId, MAX_TEXT_LENGTH, TaskDoc, TaskDraft, Timestamp, WriteTimestamp,
};
use taskmirror_proto::wire::{OrderKey, SortDirection};

use super::{Gateway, GatewayError, Subscription, SubscriptionEvent, SubscriptionFeed};

/// Buffer size for each subscriber's event channel.
const SNAPSHOT_BUFFER: usize = 64;

/// A document held by the in-process collection.
#[derive(Debug, Clone)]
struct StoredDoc {
    id: DocId,
    text: String,
    created_at: Timestamp,
}

/// A registered subscriber and its requested ordering.
struct Subscriber {
    feed: SubscriptionFeed,
    order_key: OrderKey,
    direction: SortDirection,
}

/// Mutable collection state shared by all clones of the gateway.
#[derive(Default)]
struct CollectionState {
    docs: Vec<StoredDoc>,
    clock_ms: u64,
    subscribers: Vec<Subscriber>,
    reject_subscriptions: Option<String>,
    fail_writes: Option<String>,
    add_calls: usize,
    delete_calls: usize,
}

impl CollectionState {
    /// Returns a strictly monotonic server timestamp.
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

/// In-process gateway backed by a shared in-memory collection.
#[derive(Clone, Default)]
pub struct LoopbackGateway {
    state: Arc<Mutex<CollectionState>>,
}

impl LoopbackGateway {
    /// Creates a gateway over a new, empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with the given reason, or restores
    /// normal behavior with `None`.
    pub async fn set_fail_writes(&self, reason: Option<&str>) {
        self.state.lock().await.fail_writes = reason.map(str::to_string);
    }

    /// Makes every subsequent subscribe attempt be rejected with the given
    /// reason, or restores normal behavior with `None`.
    pub async fn set_reject_subscriptions(&self, reason: Option<&str>) {
        self.state.lock().await.reject_subscriptions = reason.map(str::to_string);
    }

    /// Pushes a raw snapshot to every live subscriber, bypassing the
    /// collection. Lets tests deliver arbitrary document sets, including
    /// documents whose `created_at` is still unresolved.
    pub async fn emit_snapshot(&self, docs: Vec<TaskDoc>) {
        let mut state = self.state.lock().await;
        let subscribers = std::mem::take(&mut state.subscribers);
        let mut live = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            if subscriber
                .feed
                .push(SubscriptionEvent::Snapshot(docs.clone()))
                .await
            {
                live.push(subscriber);
            }
        }
        state.subscribers = live;
    }

    /// Fails every live subscription with the given reason and drops the
    /// feeds, ending delivery exactly as a remote channel failure would.
    pub async fn emit_error(&self, reason: &str) {
        let mut state = self.state.lock().await;
        for subscriber in state.subscribers.drain(..) {
            subscriber
                .feed
                .push(SubscriptionEvent::Error(reason.to_string()))
                .await;
        }
    }

    /// Number of times `add` has been invoked (including failed calls).
    pub async fn add_calls(&self) -> usize {
        self.state.lock().await.add_calls
    }

    /// Number of times `delete_by_id` has been invoked (including failed calls).
    pub async fn delete_calls(&self) -> usize {
        self.state.lock().await.delete_calls
    }

    /// Number of documents currently in the collection.
    pub async fn doc_count(&self) -> usize {
        self.state.lock().await.docs.len()
    }

    /// Broadcasts the current collection to every live subscriber, dropping
    /// subscribers whose channel has gone away.
    async fn broadcast(state: &mut CollectionState) {
        let subscribers = std::mem::take(&mut state.subscribers);
        let mut live = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let docs = ordered_docs(&state.docs, subscriber.order_key, subscriber.direction);
            if subscriber
                .feed
                .push(SubscriptionEvent::Snapshot(docs))
                .await
            {
                live.push(subscriber);
            }
        }
        state.subscribers = live;
    }
}

/// Projects the stored documents in the requested order.
///
/// Ties on `created_at` break by document id — an internal choice of this
/// store, opaque to clients, which preserve snapshot order as delivered.
fn ordered_docs(docs: &[StoredDoc], _key: OrderKey, direction: SortDirection) -> Vec<TaskDoc> {
    let mut sorted: Vec<&StoredDoc> = docs.iter().collect();
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

impl Gateway for LoopbackGateway {
    async fn subscribe(
        &self,
        order_key: OrderKey,
        direction: SortDirection,
    ) -> Result<Subscription, GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.reject_subscriptions {
            return Err(GatewayError::SubscriptionRejected(reason.clone()));
        }

        let (feed, subscription) = Subscription::channel(SNAPSHOT_BUFFER);
        feed.push(SubscriptionEvent::Snapshot(ordered_docs(
            &state.docs,
            order_key,
            direction,
        )))
        .await;
        state.subscribers.push(Subscriber {
            feed,
            order_key,
            direction,
        });
        Ok(subscription)
    }

    async fn add(&self, draft: TaskDraft) -> Result<DocId, GatewayError> {
        let mut state = self.state.lock().await;
        state.add_calls += 1;

        if let Some(reason) = &state.fail_writes {
            return Err(GatewayError::WriteRejected(reason.clone()));
        }
        if draft.text.trim().is_empty() {
            return Err(GatewayError::WriteRejected(
                "task text cannot be empty".to_string(),
            ));
        }
        if draft.text.chars().count() > MAX_TEXT_LENGTH {
            return Err(GatewayError::WriteRejected(format!(
                "task text too long (max {MAX_TEXT_LENGTH} characters)"
            )));
        }

        let created_at = match draft.created_at {
            WriteTimestamp::Server => state.next_timestamp(),
            WriteTimestamp::At(ts) => {
                state.clock_ms = state.clock_ms.max(ts.as_millis());
                ts
            }
        };
        let id = DocId::new();
        state.docs.push(StoredDoc {
            id: id.clone(),
            text: draft.text,
            created_at,
        });

        Self::broadcast(&mut state).await;
        Ok(id)
    }

    async fn delete_by_id(&self, id: &DocId) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.delete_calls += 1;

        if let Some(reason) = &state.fail_writes {
            return Err(GatewayError::WriteRejected(reason.clone()));
        }

        let before = state.docs.len();
        state.docs.retain(|d| d.id != *id);
        if state.docs.len() != before {
            Self::broadcast(&mut state).await;
        }
        // Absent id: nothing changed, no snapshot, still a success.
        Ok(())
    }

    fn server_timestamp_marker(&self) -> WriteTimestamp {
        WriteTimestamp::Server
    }
}
