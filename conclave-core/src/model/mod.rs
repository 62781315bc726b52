mod entity;
mod error;
mod media;
mod peer;
mod request;
mod room;
mod signaling;
mod transport;

pub use entity::{ConsumerId, ProducerId, TransportId};
pub use error::{ErrorKind, ErrorReply};
pub use media::{
    Direction, MediaKind, RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpEncoding,
    RtpHeaderExtension, RtpHeaderExtensionParameters, RtpParameters,
};
pub use peer::PeerId;
pub use request::RequestId;
pub use room::RoomId;
pub use signaling::{
    Ack, ClientMessage, CloseProducerRequest, ConnectTransportRequest, ConsumeRequest,
    ConsumerDescriptor, JoinRequest, JoinResponse, Outcome, PeerInfo, PeerLeft, ProduceRequest,
    Produced, ProducerAvailable, ProducerClosed, ResponseBody, ResumeConsumerRequest,
    RoomScopedRequest, ServerMessage, SignalRequest, Welcome,
};
pub use transport::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters, IceProtocol,
    TransportParams,
};
