use crate::model::entity::{ConsumerId, ProducerId};
use crate::model::error::ErrorReply;
use crate::model::media::{MediaKind, RtpCapabilities, RtpParameters};
use crate::model::peer::PeerId;
use crate::model::request::RequestId;
use crate::model::room::RoomId;
use crate::model::transport::{DtlsParameters, TransportParams};
use serde::{Deserialize, Serialize};

/// A request frame sent by a peer. The coordinator answers every one of them
/// with an [`Ack`] carrying the same id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClientMessage {
    pub id: RequestId,
    pub request: SignalRequest,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum SignalRequest {
    Join(JoinRequest),
    CreateSendTransport(RoomScopedRequest),
    ConnectSendTransport(ConnectTransportRequest),
    Produce(ProduceRequest),
    CreateRecvTransport(RoomScopedRequest),
    ConnectRecvTransport(ConnectTransportRequest),
    Consume(ConsumeRequest),
    ResumeConsumer(ResumeConsumerRequest),
    CloseProducer(CloseProducerRequest),
}

impl SignalRequest {
    /// Wire name of the operation, for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::CreateSendTransport(_) => "create-send-transport",
            Self::ConnectSendTransport(_) => "connect-send-transport",
            Self::Produce(_) => "produce",
            Self::CreateRecvTransport(_) => "create-recv-transport",
            Self::ConnectRecvTransport(_) => "connect-recv-transport",
            Self::Consume(_) => "consume",
            Self::ResumeConsumer(_) => "resume-consumer",
            Self::CloseProducer(_) => "close-producer",
        }
    }

    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Join(r) => &r.room_id,
            Self::CreateSendTransport(r) | Self::CreateRecvTransport(r) => &r.room_id,
            Self::ConnectSendTransport(r) | Self::ConnectRecvTransport(r) => &r.room_id,
            Self::Produce(r) => &r.room_id,
            Self::Consume(r) => &r.room_id,
            Self::ResumeConsumer(r) => &r.room_id,
            Self::CloseProducer(r) => &r.room_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: RoomId,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomScopedRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub room_id: RoomId,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub room_id: RoomId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub room_id: RoomId,
    pub producer_id: ProducerId,
    pub rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConsumerRequest {
    pub room_id: RoomId,
    pub consumer_id: ConsumerId,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseProducerRequest {
    pub room_id: RoomId,
    pub producer_id: ProducerId,
}

/// Everything the coordinator pushes down a connection: acknowledgements of
/// the peer's own requests and room notifications.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome(Welcome),
    Ack(Ack),
    PeerJoined(PeerInfo),
    ProducerAvailable(ProducerAvailable),
    ProducerClosed(ProducerClosed),
    PeerLeft(PeerLeft),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub peer_id: PeerId,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ack {
    pub id: RequestId,
    pub outcome: Outcome,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok(ResponseBody),
    Error(ErrorReply),
}

impl<E: Into<ErrorReply>> From<Result<ResponseBody, E>> for Outcome {
    fn from(result: Result<ResponseBody, E>) -> Self {
        match result {
            Ok(body) => Self::Ok(body),
            Err(e) => Self::Error(e.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseBody {
    Joined(JoinResponse),
    Transport(TransportParams),
    Produced(Produced),
    Consumed(ConsumerDescriptor),
    Done,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub router_capabilities: RtpCapabilities,
    /// Peers already in the room, excluding the joiner.
    pub peers: Vec<PeerInfo>,
    pub is_host: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: PeerId,
    pub name: String,
    pub is_host: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Produced {
    pub id: ProducerId,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProducerAvailable {
    pub producer_id: ProducerId,
    pub peer_id: PeerId,
    pub kind: MediaKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProducerClosed {
    pub producer_id: ProducerId,
    pub peer_id: PeerId,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeft {
    pub peer_id: PeerId,
}
