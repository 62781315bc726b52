use conclave_client::{LocalTrack, SessionEvent};
use conclave_core::MediaKind;

use crate::integration::{ROOM, controller, init_tracing, start};
use crate::utils::{CountingChannel, LocalChannel, test_service, wait_for, wait_for_tracks};

#[tokio::test]
async fn test_peer_events() {
    init_tracing();
    let service = test_service();

    let (alice_channel, alice_notes) = LocalChannel::connect(&service).await;
    let (alice, mut alice_events) = controller(alice_channel.clone());
    alice.join(ROOM, "alice").await.unwrap();
    start(&alice, alice_notes);

    let (bob_channel, bob_notes) = LocalChannel::connect(&service).await;
    let bob_id = bob_channel.peer_id().await;
    let counting = CountingChannel::new(bob_channel.clone());
    let (bob, _bob_events) = controller(counting.clone());
    bob.join(ROOM, "bob").await.unwrap();
    start(&bob, bob_notes);

    let joined = wait_for(&mut alice_events, |event| match event {
        SessionEvent::PeerJoined(info) => Some(info),
        _ => None,
    })
    .await
    .unwrap();
    assert_eq!(joined.id, bob_id);
    assert_eq!(joined.name, "bob");
    assert!(!joined.is_host);

    let placeholder = alice.stream(&bob_id).expect("No stream for bob");
    assert!(placeholder.is_empty());

    bob.publish(LocalTrack::new(MediaKind::Video, "cam")).await.unwrap();
    bob.publish(LocalTrack::new(MediaKind::Audio, "mic")).await.unwrap();

    let stream = wait_for_tracks(&mut alice_events, &bob_id, 2).await.unwrap();
    assert_eq!(stream.id(), placeholder.id());

    // both producers share one send transport
    assert_eq!(counting.count("create-send-transport"), 1);
    assert_eq!(counting.count("connect-send-transport"), 1);
    assert_eq!(counting.count("produce"), 2);
    let (send, recv) = bob.transports();
    assert!(send.is_some() && recv.is_some());
    assert_ne!(send, recv);
}
