use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use conclave_client::{RemoteStream, SessionEvent};
use conclave_core::{PeerId, ServerMessage, Welcome};
use conclave_server::{LocalEngine, RoomRegistry, RouterConfig, SignalingService, signaling_router};

pub fn test_service() -> SignalingService {
    let engine = LocalEngine::default();
    SignalingService::new(RoomRegistry::new(Arc::new(engine), RouterConfig::default()))
}

/// Serves the signaling endpoint on an ephemeral port and returns its
/// WebSocket URL.
pub async fn spawn_server(service: SignalingService) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind test listener")?;
    let addr: SocketAddr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, signaling_router(service)).await {
            eprintln!("test server stopped: {}", e);
        }
    });

    Ok(format!("ws://{}/ws", addr))
}

/// A server that accepts one connection, sends `welcome` and hangs up.
pub async fn spawn_closing_server() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind test listener")?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut ws = tokio_tungstenite::accept_async(stream).await?;
        let welcome = serde_json::to_string(&ServerMessage::Welcome(Welcome {
            peer_id: PeerId::new(),
        }))?;
        ws.send(Message::text(welcome)).await?;
        ws.close(None).await?;
        anyhow::Ok(())
    });

    Ok(format!("ws://{}", addr))
}

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for the next event matching `pick`, skipping the rest.
pub async fn wait_for<T>(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    mut pick: impl FnMut(SessionEvent) -> Option<T>,
) -> Result<T> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            if let Some(found) = pick(event) {
                return Ok(found);
            }
        }
        anyhow::bail!("event stream ended")
    })
    .await
    .context("timed out waiting for session event")?
}

/// Waits until `peer_id`'s stream carries exactly `tracks` tracks.
pub async fn wait_for_tracks(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    peer_id: &PeerId,
    tracks: usize,
) -> Result<RemoteStream> {
    wait_for(events, |event| match event {
        SessionEvent::StreamUpdated { peer_id: id, stream }
            if &id == peer_id && stream.tracks().len() == tracks =>
        {
            Some(stream)
        }
        _ => None,
    })
    .await
}
