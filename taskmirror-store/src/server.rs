//! Store server core: shared state, WebSocket handler, subscriber registry,
//! and snapshot broadcasting.
//!
//! The server accepts WebSocket connections and speaks the
//! `taskmirror-proto` wire protocol. Every accepted mutation acknowledges
//! the requesting connection, then pushes a fresh full snapshot — never a
//! delta — to every subscriber in that subscriber's requested order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use taskmirror_proto::codec;
use taskmirror_proto::wire::{
    ClientRequest, OrderKey, RequestId, ServerEvent, SortDirection, WriteOutcome,
};

use crate::collection::Collection;

/// A connection with a live subscription and its requested ordering.
struct Subscriber {
    tx: mpsc::UnboundedSender<Message>,
    order_key: OrderKey,
    direction: SortDirection,
}

/// Shared store state: the collection and the subscriber registry.
#[derive(Default)]
pub struct StoreState {
    /// The authoritative document collection.
    pub collection: Collection,
    /// Connections currently subscribed, keyed by connection id.
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    /// Source of connection ids.
    next_conn_id: AtomicU64,
}

impl StoreState {
    /// Creates a new store state with an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) a connection's subscription.
    ///
    /// A connection holds at most one subscription; subscribing again
    /// replaces its ordering.
    async fn subscribe(
        &self,
        conn_id: u64,
        tx: mpsc::UnboundedSender<Message>,
        order_key: OrderKey,
        direction: SortDirection,
    ) {
        let mut subs = self.subscribers.write().await;
        subs.insert(
            conn_id,
            Subscriber {
                tx,
                order_key,
                direction,
            },
        );
    }

    /// Removes a connection's subscription, if any.
    async fn unsubscribe(&self, conn_id: u64) {
        let mut subs = self.subscribers.write().await;
        subs.remove(&conn_id);
    }

    /// Pushes a fresh snapshot to every subscriber, dropping subscribers
    /// whose connection has gone away.
    async fn broadcast_snapshots(&self) {
        let mut subs = self.subscribers.write().await;
        let mut gone = Vec::new();
        for (conn_id, sub) in subs.iter() {
            let docs = self.collection.snapshot(sub.order_key, sub.direction).await;
            match codec::encode_event(&ServerEvent::Snapshot { docs }) {
                Ok(bytes) => {
                    if sub.tx.send(Message::Binary(bytes.into())).is_err() {
                        gone.push(*conn_id);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode snapshot");
                }
            }
        }
        for conn_id in gone {
            subs.remove(&conn_id);
        }
    }

    /// Number of live subscribers (for diagnostics and tests).
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Send a WebSocket Close frame to every subscribed connection.
    ///
    /// Each connection's writer task forwards the close frame, which the
    /// client observes as a channel failure. Used for graceful shutdown
    /// and in tests that exercise the connection-loss path.
    pub async fn close_all_connections(&self) {
        let subs = self.subscribers.read().await;
        for (conn_id, sub) in subs.iter() {
            tracing::info!(conn_id, "sending close frame");
            let _ = sub.tx.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Spawn a writer task draining a per-connection channel.
/// 2. Read requests, applying them to the collection and replying.
/// 3. On disconnect, drop the subscription.
pub async fn handle_socket(socket: WebSocket, state: Arc<StoreState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);

    tracing::info!(conn_id, "client connected");

    // Channel for messages destined to this connection's WebSocket.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process requests from this connection.
    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Binary(data) => match codec::decode_request(&data) {
                Ok(request) => handle_request(conn_id, request, &tx, &state).await,
                Err(e) => {
                    tracing::warn!(conn_id, error = %e, "undecodable client frame");
                }
            },
            Message::Close(_) => {
                tracing::info!(conn_id, "received close frame");
                break;
            }
            _ => {
                // Ignore text, ping, pong frames.
            }
        }
    }

    state.unsubscribe(conn_id).await;
    drop(tx);
    let _ = write_task.await;
    tracing::info!(conn_id, "client disconnected");
}

/// Applies one client request.
async fn handle_request(
    conn_id: u64,
    request: ClientRequest,
    tx: &mpsc::UnboundedSender<Message>,
    state: &Arc<StoreState>,
) {
    match request {
        ClientRequest::Subscribe {
            order_key,
            direction,
        } => {
            tracing::info!(conn_id, ?direction, "subscription opened");
            state
                .subscribe(conn_id, tx.clone(), order_key, direction)
                .await;
            // Initial snapshot reflecting current state.
            let docs = state.collection.snapshot(order_key, direction).await;
            send_event(tx, &ServerEvent::Snapshot { docs });
        }
        ClientRequest::Unsubscribe => {
            tracing::info!(conn_id, "subscription closed by client");
            state.unsubscribe(conn_id).await;
        }
        ClientRequest::Add { request_id, draft } => {
            match state.collection.insert(&draft).await {
                Ok(id) => {
                    tracing::debug!(conn_id, doc_id = %id, "document added");
                    send_ack(tx, request_id, WriteOutcome::Added { id });
                    state.broadcast_snapshots().await;
                }
                Err(e) => {
                    tracing::debug!(conn_id, error = %e, "add rejected");
                    send_ack(
                        tx,
                        request_id,
                        WriteOutcome::Rejected {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }
        ClientRequest::Delete { request_id, id } => {
            let removed = state.collection.remove(&id).await;
            tracing::debug!(conn_id, doc_id = %id, removed, "delete handled");
            // Absent ids ack as success; deletion is idempotent.
            send_ack(tx, request_id, WriteOutcome::Deleted);
            if removed {
                state.broadcast_snapshots().await;
            }
        }
    }
}

/// Encodes and queues an event for one connection.
fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    match codec::encode_event(event) {
        Ok(bytes) => {
            let _ = tx.send(Message::Binary(bytes.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server event");
        }
    }
}

/// Encodes and queues a write acknowledgment.
fn send_ack(tx: &mpsc::UnboundedSender<Message>, request_id: RequestId, outcome: WriteOutcome) {
    send_event(
        tx,
        &ServerEvent::Ack {
            request_id,
            outcome,
        },
    );
}

/// Starts the store server on the given address with fresh state.
///
/// Returns the bound address (useful with port 0) and a [`tokio::task::JoinHandle`]
/// for the serving task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(StoreState::new())).await
}

/// Starts the store server with a pre-configured [`StoreState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<StoreState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "store server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<StoreState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
