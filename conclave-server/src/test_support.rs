use conclave_core::{
    DtlsFingerprint, DtlsParameters, DtlsRole, RtpCodecParameters, RtpEncoding, RtpParameters,
};
use std::collections::BTreeMap;

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
        encodings: vec![RtpEncoding::default()],
    }
}

pub(crate) fn vp8_parameters() -> RtpParameters {
    single_codec("video/VP8", 90000, None)
}

pub(crate) fn opus_parameters() -> RtpParameters {
    single_codec("audio/opus", 48000, Some(2))
}

pub(crate) fn client_dtls() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: "AA:BB".to_owned(),
        }],
    }
}
