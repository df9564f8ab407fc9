//! WebSocket gateway to a `taskmirror-store` server.
//!
//! Implements the [`Gateway`] trait over a WebSocket connection speaking the
//! `taskmirror-proto` wire protocol. A background reader task routes server
//! events: snapshots and subscription errors go to the live subscription
//! feed, write acknowledgments complete per-request oneshot channels
//! correlated by [`RequestId`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskmirror_proto::codec;
use taskmirror_proto::doc::{DocId, TaskDraft, WriteTimestamp};
use taskmirror_proto::wire::{ClientRequest, OrderKey, RequestId, ServerEvent, SortDirection, WriteOutcome};

use super::{Gateway, GatewayError, Subscription, SubscriptionEvent, SubscriptionFeed};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Timeout for connecting to the store server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for a write acknowledgment from the store.
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer size for the subscription event channel.
const SNAPSHOT_BUFFER: usize = 64;

/// Outstanding write requests awaiting their acknowledgment.
type PendingAcks = Mutex<HashMap<RequestId, oneshot::Sender<WriteOutcome>>>;

/// WebSocket gateway implementing the [`Gateway`] trait.
///
/// Created via [`RemoteGateway::connect`], which validates the URL,
/// establishes the WebSocket connection, and spawns a background reader
/// task. At most one live subscription is open per connection; a second
/// `subscribe` without unsubscribing the first returns
/// [`GatewayError::SubscriptionActive`].
#[derive(Debug)]
pub struct RemoteGateway {
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Outstanding write requests, completed by the reader task.
    pending: Arc<PendingAcks>,
    /// The live subscription feed, if one is open.
    feed_slot: Arc<Mutex<Option<SubscriptionFeed>>>,
    /// Whether the WebSocket connection is still up.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task (kept for the gateway's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl RemoteGateway {
    /// Connects to a store server.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidUrl`] if `gateway_url` is not a `ws://` or
    ///   `wss://` URL.
    /// - [`GatewayError::Timeout`] if the connection attempt times out.
    /// - [`GatewayError::Io`] if the WebSocket handshake fails.
    pub async fn connect(gateway_url: &str) -> Result<Self, GatewayError> {
        let parsed = url::Url::parse(gateway_url)
            .map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(GatewayError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme, got {}://",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(gateway_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = gateway_url, "gateway connect timed out");
                    GatewayError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = gateway_url, err = %e, "gateway connect failed");
                    GatewayError::Io(std::io::Error::other(e))
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let ws_sender = Arc::new(Mutex::new(ws_sender));
        let pending: Arc<PendingAcks> = Arc::new(Mutex::new(HashMap::new()));
        let feed_slot: Arc<Mutex<Option<SubscriptionFeed>>> = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&ws_sender),
            Arc::clone(&pending),
            Arc::clone(&feed_slot),
            Arc::clone(&connected),
        ));

        Ok(Self {
            ws_sender,
            pending,
            feed_slot,
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// Returns whether the connection to the store is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Encodes and sends a request over the WebSocket.
    async fn send_request(&self, request: &ClientRequest) -> Result<(), GatewayError> {
        let bytes = codec::encode_request(request)
            .map_err(|e| GatewayError::Io(std::io::Error::other(e)))?;
        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|_| GatewayError::ConnectionClosed)
    }

    /// Sends a write request and awaits its acknowledgment.
    async fn request_ack(
        &self,
        request_id: RequestId,
        request: ClientRequest,
    ) -> Result<WriteOutcome, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if let Err(e) = self.send_request(&request).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(ACK_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            // Sender dropped: the reader task observed the connection closing.
            Ok(Err(_)) => Err(GatewayError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(GatewayError::Timeout)
            }
        }
    }
}

impl Gateway for RemoteGateway {
    async fn subscribe(
        &self,
        order_key: OrderKey,
        direction: SortDirection,
    ) -> Result<Subscription, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::ConnectionClosed);
        }

        let mut slot = self.feed_slot.lock().await;
        if slot.as_ref().is_some_and(SubscriptionFeed::is_open) {
            return Err(GatewayError::SubscriptionActive);
        }
        let (feed, subscription) = Subscription::channel(SNAPSHOT_BUFFER);
        // Park the feed before asking the store to subscribe, so the initial
        // snapshot cannot race past an empty slot.
        *slot = Some(feed);
        drop(slot);

        if let Err(e) = self
            .send_request(&ClientRequest::Subscribe {
                order_key,
                direction,
            })
            .await
        {
            self.feed_slot.lock().await.take();
            return Err(e);
        }
        Ok(subscription)
    }

    async fn add(&self, draft: TaskDraft) -> Result<DocId, GatewayError> {
        let request_id = RequestId::new();
        let outcome = self
            .request_ack(request_id, ClientRequest::Add { request_id, draft })
            .await?;
        match outcome {
            WriteOutcome::Added { id } => Ok(id),
            WriteOutcome::Rejected { reason } => Err(GatewayError::WriteRejected(reason)),
            WriteOutcome::Deleted => Err(GatewayError::WriteRejected(
                "store acknowledged an add as a delete".to_string(),
            )),
        }
    }

    async fn delete_by_id(&self, id: &DocId) -> Result<(), GatewayError> {
        let request_id = RequestId::new();
        let outcome = self
            .request_ack(
                request_id,
                ClientRequest::Delete {
                    request_id,
                    id: id.clone(),
                },
            )
            .await?;
        match outcome {
            WriteOutcome::Deleted => Ok(()),
            WriteOutcome::Rejected { reason } => Err(GatewayError::WriteRejected(reason)),
            WriteOutcome::Added { .. } => Err(GatewayError::WriteRejected(
                "store acknowledged a delete as an add".to_string(),
            )),
        }
    }

    fn server_timestamp_marker(&self) -> WriteTimestamp {
        WriteTimestamp::Server
    }
}

/// Background task: reads server events and routes them.
async fn reader_loop(
    mut ws_reader: futures_util::stream::SplitStream<
        WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    >,
    ws_sender: Arc<Mutex<WsSender>>,
    pending: Arc<PendingAcks>,
    feed_slot: Arc<Mutex<Option<SubscriptionFeed>>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(Ok(msg)) = ws_reader.next().await {
        match msg {
            Message::Binary(data) => {
                let event = match codec::decode_event(&data) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable server frame, skipping");
                        continue;
                    }
                };
                route_event(event, &ws_sender, &pending, &feed_slot).await;
            }
            Message::Close(_) => {
                tracing::info!("store sent close frame");
                break;
            }
            _ => {
                // Ignore text, ping, pong frames.
            }
        }
    }

    connected.store(false, Ordering::SeqCst);

    // Connection lost: error the live subscription (reported once, the
    // session freezes its list) and fail all in-flight writes by dropping
    // their ack senders.
    if let Some(feed) = feed_slot.lock().await.take() {
        feed.push(SubscriptionEvent::Error(
            "gateway connection closed".to_string(),
        ))
        .await;
    }
    pending.lock().await.clear();
}

/// Routes a single decoded server event.
async fn route_event(
    event: ServerEvent,
    ws_sender: &Arc<Mutex<WsSender>>,
    pending: &Arc<PendingAcks>,
    feed_slot: &Arc<Mutex<Option<SubscriptionFeed>>>,
) {
    match event {
        ServerEvent::Snapshot { docs } => {
            let mut slot = feed_slot.lock().await;
            let delivered = match slot.as_ref() {
                Some(feed) => feed.push(SubscriptionEvent::Snapshot(docs)).await,
                None => false,
            };
            if !delivered && slot.take().is_some() {
                drop(slot);
                // Subscriber went away; tell the store to stop pushing.
                if let Ok(bytes) = codec::encode_request(&ClientRequest::Unsubscribe) {
                    let _ = ws_sender.lock().await.send(Message::Binary(bytes.into())).await;
                }
            }
        }
        ServerEvent::SubscriptionError { reason } => {
            tracing::warn!(%reason, "store reported subscription error");
            if let Some(feed) = feed_slot.lock().await.take() {
                feed.push(SubscriptionEvent::Error(reason)).await;
            }
        }
        ServerEvent::Ack {
            request_id,
            outcome,
        } => {
            if let Some(tx) = pending.lock().await.remove(&request_id) {
                let _ = tx.send(outcome);
            } else {
                tracing::debug!(%request_id, "ack for unknown request (likely timed out)");
            }
        }
    }
}
