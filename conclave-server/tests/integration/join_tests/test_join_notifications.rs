use conclave_core::{PeerInfo, RoomId};

use crate::integration::{ROOM, init_tracing};
use crate::utils::{TestPeer, test_service};

#[tokio::test]
async fn test_join_notifications() {
    init_tracing();

    let (service, _engine) = test_service();
    let mut alice = TestPeer::connect(&service).await.expect("Failed to connect alice");
    let mut bob = TestPeer::connect(&service).await.expect("Failed to connect bob");

    let joined = alice.join(ROOM, "alice").await.expect("Alice join failed");
    assert!(joined.is_host);
    assert!(joined.peers.is_empty());
    assert!(!joined.router_capabilities.codecs.is_empty());

    let joined = bob.join(ROOM, "bob").await.expect("Bob join failed");
    assert!(!joined.is_host);
    assert_eq!(
        joined.peers,
        vec![PeerInfo {
            id: alice.peer_id.clone(),
            name: "alice".to_owned(),
            is_host: true,
        }]
    );

    assert_eq!(
        alice.joined_peers(),
        vec![PeerInfo {
            id: bob.peer_id.clone(),
            name: "bob".to_owned(),
            is_host: false,
        }]
    );
    assert!(bob.joined_peers().is_empty(), "Joiner is not told about itself");

    let room = service.registry().get(&RoomId::from(ROOM)).unwrap();
    let mut names: Vec<String> = room.list_peers().into_iter().map(|p| p.name).collect();
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_rooms_are_independent() {
    init_tracing();

    let (service, _engine) = test_service();
    let mut alice = TestPeer::connect(&service).await.unwrap();
    let mut bob = TestPeer::connect(&service).await.unwrap();

    assert!(alice.join("R1", "alice").await.unwrap().is_host);
    assert!(bob.join("R2", "bob").await.unwrap().is_host);

    assert_eq!(service.registry().len(), 2);
    assert!(alice.notifications().is_empty());
    assert!(bob.notifications().is_empty());
}
