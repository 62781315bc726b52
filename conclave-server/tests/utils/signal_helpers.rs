use std::collections::BTreeMap;
use std::sync::Arc;

use conclave_core::{
    DtlsFingerprint, DtlsParameters, DtlsRole, RtpCodecParameters, RtpEncoding, RtpParameters,
};
use conclave_server::{LocalEngine, RoomRegistry, RouterConfig, SignalingService};

fn single_codec(mime_type: &str, clock_rate: u32, channels: Option<u8>) -> RtpParameters {
    RtpParameters {
        mid: Some("0".to_owned()),
        codecs: vec![RtpCodecParameters {
            mime_type: mime_type.to_owned(),
            payload_type: 96,
            clock_rate,
            channels,
            parameters: BTreeMap::new(),
        }],
        header_extensions: Vec::new(),
        encodings: vec![RtpEncoding {
            ssrc: Some(1111),
            rid: None,
        }],
    }
}

pub fn vp8_parameters() -> RtpParameters {
    single_codec("video/VP8", 90000, None)
}

pub fn opus_parameters() -> RtpParameters {
    single_codec("audio/opus", 48000, Some(2))
}

pub fn client_dtls() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: "01:23:45:67:89:AB:CD:EF".to_owned(),
        }],
    }
}

pub fn test_registry() -> (RoomRegistry, LocalEngine) {
    let engine = LocalEngine::default();
    let registry = RoomRegistry::new(Arc::new(engine.clone()), RouterConfig::default());
    (registry, engine)
}

/// A service backed by an in-process engine. The engine handle lets tests
/// pull the plug.
pub fn test_service() -> (SignalingService, LocalEngine) {
    let (registry, engine) = test_registry();
    (SignalingService::new(registry), engine)
}
