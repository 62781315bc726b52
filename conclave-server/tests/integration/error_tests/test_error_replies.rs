use conclave_core::{
    ConnectTransportRequest, Direction, ErrorKind, JoinRequest, MediaKind, Outcome,
    ProduceRequest, ResumeConsumerRequest, RoomId, RtpCapabilities, ServerMessage,
    SignalRequest,
};

use crate::integration::{ROOM, init_tracing};
use crate::utils::{TestPeer, client_dtls, opus_parameters, test_service, vp8_parameters};

fn produce(kind: MediaKind, rtp_parameters: conclave_core::RtpParameters) -> SignalRequest {
    SignalRequest::Produce(ProduceRequest {
        room_id: RoomId::from(ROOM),
        kind,
        rtp_parameters,
    })
}

#[tokio::test]
async fn test_error_replies() {
    init_tracing();

    let (service, _engine) = test_service();
    let mut alice = TestPeer::connect(&service).await.unwrap();
    let mut bob = TestPeer::connect(&service).await.unwrap();

    let capabilities = alice.join(ROOM, "alice").await.unwrap().router_capabilities;
    bob.join(ROOM, "bob").await.unwrap();

    let kind = alice
        .reject(SignalRequest::Join(JoinRequest {
            room_id: RoomId::from(ROOM),
            name: "again".to_owned(),
        }))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::DuplicatePeer);

    let kind = alice
        .reject(produce(MediaKind::Video, vp8_parameters()))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::NoSendTransport);

    let kind = alice
        .reject(SignalRequest::ConnectRecvTransport(ConnectTransportRequest {
            room_id: RoomId::from(ROOM),
            dtls_parameters: client_dtls(),
        }))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::TransportNotFound);

    alice.setup_transports(ROOM).await.unwrap();
    let producer_id = alice
        .produce(ROOM, MediaKind::Audio, opus_parameters())
        .await
        .unwrap();

    let kind = bob
        .reject(TestPeer::consume_request(ROOM, &producer_id, capabilities.clone()))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::TransportNotFound, "Bob has no receive transport yet");

    bob.create_transport(ROOM, Direction::Recv).await.unwrap();

    let mut video_only = capabilities.clone();
    video_only.codecs.retain(|c| c.kind == MediaKind::Video);
    let kind = bob
        .reject(TestPeer::consume_request(ROOM, &producer_id, video_only))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::IncompatibleCapabilities);

    let kind = bob
        .reject(TestPeer::consume_request(
            ROOM,
            &producer_id,
            RtpCapabilities::default(),
        ))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::IncompatibleCapabilities);

    let kind = bob
        .reject(SignalRequest::ResumeConsumer(ResumeConsumerRequest {
            room_id: RoomId::from(ROOM),
            consumer_id: "missing".into(),
        }))
        .await
        .unwrap();
    assert_eq!(kind, ErrorKind::ConsumerNotFound);

    let mut h264 = vp8_parameters();
    h264.codecs[0].mime_type = "video/H264".to_owned();
    let outcome = alice
        .request(produce(MediaKind::Video, h264))
        .await
        .unwrap();
    match outcome {
        Outcome::Error(reply) => {
            assert_eq!(reply.kind, ErrorKind::EngineFailure);
            assert!(reply.message.contains("video/H264"));
        }
        other => panic!("Expected engine failure, got {:?}", other),
    }

    // nothing of the above reached the other peer
    assert!(bob.announcements().len() == 1);
    assert!(bob.closed_producers().is_empty());
}

#[tokio::test]
async fn test_undecodable_frames_are_ignored() {
    init_tracing();

    let (service, _engine) = test_service();
    let mut alice = TestPeer::connect(&service).await.unwrap();

    alice.send_text("not json at all").await;
    alice
        .send_text(r#"{"id":1,"request":{"op":"dance","d":{}}}"#)
        .await;
    alice.send_text(r#"{"request":{"op":"join"}}"#).await;
    assert!(alice.received().is_empty(), "No reply for undecodable frames");

    let joined = alice.join(ROOM, "alice").await.unwrap();
    assert!(joined.is_host);
    assert!(matches!(alice.received(), [ServerMessage::Ack(_)]));
}
