use std::time::Duration;

use conclave_client::{ClientError, SignalingChannel, WsChannel};
use conclave_core::{JoinRequest, RoomId, SignalRequest};

use crate::integration::{ROOM, init_tracing};
use crate::utils::spawn_closing_server;

fn join_request() -> SignalRequest {
    SignalRequest::Join(JoinRequest {
        room_id: RoomId::from(ROOM),
        name: "alice".to_owned(),
    })
}

#[tokio::test]
async fn test_requests_fail_after_server_hangs_up() {
    init_tracing();
    let url = spawn_closing_server().await.expect("Failed to start server");

    let (channel, mut notifications) = WsChannel::connect(&url).await.expect("Connect failed");

    // the notification stream ends once the reader sees the close
    let ended = tokio::time::timeout(Duration::from_secs(3), notifications.recv())
        .await
        .expect("Notification stream did not end");
    assert!(ended.is_none());
    assert!(channel.is_closed());

    let outcome = tokio::time::timeout(Duration::from_secs(3), channel.request(join_request()))
        .await
        .expect("Request hung on a closed connection");
    assert!(matches!(outcome, Err(ClientError::ChannelClosed)));

    // and keeps failing fast
    let again = tokio::time::timeout(Duration::from_secs(3), channel.request(join_request()))
        .await
        .expect("Second request hung");
    assert!(matches!(again, Err(ClientError::ChannelClosed)));
}
