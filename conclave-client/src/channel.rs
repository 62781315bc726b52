use crate::error::ClientError;
use async_trait::async_trait;
use conclave_core::{
    ClientMessage, Outcome, PeerId, RequestId, ResponseBody, ServerMessage, SignalRequest,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Request/reply half of a signaling connection.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Sends a request and waits for its ack. Error acks become
    /// [`ClientError::Rejected`].
    async fn request(&self, request: SignalRequest) -> Result<ResponseBody, ClientError>;
}

type Pending = Arc<DashMap<RequestId, oneshot::Sender<Outcome>>>;

/// Correlates acks with waiting requests and forwards everything else.
/// Notifications nobody listens for are dropped; acks keep flowing.
pub fn route_server_message(
    pending: &DashMap<RequestId, oneshot::Sender<Outcome>>,
    notifications: &mpsc::UnboundedSender<ServerMessage>,
    message: ServerMessage,
) {
    match message {
        ServerMessage::Ack(ack) => match pending.remove(&ack.id) {
            Some((_, waiter)) => {
                let _ = waiter.send(ack.outcome);
            }
            None => warn!(request_id = %ack.id, "Ack for unknown request"),
        },
        other => {
            if notifications.send(other).is_err() {
                debug!("Notification dropped, receiver gone");
            }
        }
    }
}

/// Marks the connection dead and fails every waiting request. Set before
/// clearing so a request inserted afterwards sees the flag.
fn shut(closed: &AtomicBool, pending: &DashMap<RequestId, oneshot::Sender<Outcome>>) {
    closed.store(true, Ordering::SeqCst);
    // dropping the waiters fails their requests with ChannelClosed
    pending.clear();
}

/// [`SignalingChannel`] over a WebSocket, speaking JSON text frames.
pub struct WsChannel {
    peer_id: PeerId,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl WsChannel {
    /// Connects to `url` and waits for the server's `welcome`. The returned
    /// receiver yields every room notification addressed to this peer.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>), ClientError> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let peer_id = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str())? {
                        ServerMessage::Welcome(welcome) => break welcome.peer_id,
                        other => {
                            return Err(ClientError::Protocol(format!(
                                "expected welcome, got {:?}",
                                other
                            )));
                        }
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::ChannelClosed),
            }
        };
        info!(peer_id = %peer_id, url, "Signaling connected");

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn({
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            async move {
                while let Some(msg) = outgoing_rx.recv().await {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize request: {}", e);
                            continue;
                        }
                    };
                    if write.send(Message::text(json)).await.is_err() {
                        break;
                    }
                }
                debug!("Signaling writer finished");
                shut(&closed, &pending);
                let _ = write.close().await;
            }
        });

        tokio::spawn({
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            async move {
                while let Some(msg) = read.next().await {
                    let text = match msg {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Signaling read failed: {}", e);
                            break;
                        }
                    };
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => route_server_message(&pending, &notify_tx, message),
                        Err(e) => warn!("Undecodable server frame: {}", e),
                    }
                }
                info!("Signaling connection closed");
                shut(&closed, &pending);
            }
        });

        Ok((
            Self {
                peer_id,
                outgoing,
                pending,
                closed,
                next_id: AtomicU64::new(1),
            },
            notify_rx,
        ))
    }

    /// Id the server assigned to this connection.
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// True once either side of the socket has stopped. Every request
    /// fails with [`ClientError::ChannelClosed`] from then on.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingChannel for WsChannel {
    async fn request(&self, request: SignalRequest) -> Result<ResponseBody, ClientError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(ClientError::ChannelClosed);
        }

        debug!(request_id = %id, op = request.op(), "Sending request");
        if self.outgoing.send(ClientMessage { id, request }).is_err() {
            self.pending.remove(&id);
            return Err(ClientError::ChannelClosed);
        }

        match rx.await.map_err(|_| ClientError::ChannelClosed)? {
            Outcome::Ok(body) => Ok(body),
            Outcome::Error(reply) => Err(ClientError::Rejected(reply)),
        }
    }
}
