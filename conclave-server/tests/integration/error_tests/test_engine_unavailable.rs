use conclave_core::{Direction, ErrorKind, JoinRequest, RoomId, RoomScopedRequest, SignalRequest};

use crate::integration::{ROOM, init_tracing};
use crate::utils::{TestPeer, test_service};

#[tokio::test]
async fn test_engine_unavailable() {
    init_tracing();

    let (service, engine) = test_service();
    let mut alice = TestPeer::connect(&service).await.unwrap();
    let mut bob = TestPeer::connect(&service).await.unwrap();
    let mut carol = TestPeer::connect(&service).await.unwrap();

    alice.join(ROOM, "alice").await.unwrap();
    alice.create_transport(ROOM, Direction::Send).await.unwrap();
    assert!(!service.registry().is_degraded());

    engine.shut_down();

    let kind = bob
        .reject(SignalRequest::Join(JoinRequest {
            room_id: RoomId::from("R2"),
            name: "bob".to_owned(),
        }))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::EngineUnavailable);
    assert!(service.registry().is_degraded());
    assert!(!service.registry().contains(&RoomId::from("R2")));

    let kind = alice
        .reject(SignalRequest::CreateRecvTransport(RoomScopedRequest {
            room_id: RoomId::from(ROOM),
        }))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::EngineUnavailable);

    // existing room state is left intact
    let joined = carol.join(ROOM, "carol").await.unwrap();
    assert!(!joined.is_host);
    assert_eq!(joined.peers.len(), 1);
    assert_eq!(alice.joined_peers().len(), 1);

    alice.disconnect().await;
    carol.disconnect().await;
    assert!(service.registry().is_empty());
}
