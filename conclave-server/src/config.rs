use anyhow::{Context, Result, ensure};
use conclave_core::{MediaKind, RtpCodecCapability};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};

/// Top-level server settings. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub router: RouterConfig,
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3001)),
            router: RouterConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.router.media_codecs.is_empty(),
            "router needs at least one media codec"
        );
        for codec in &self.router.media_codecs {
            ensure!(
                MediaKind::from_mime(&codec.mime_type) == Some(codec.kind),
                "codec {} does not match kind {}",
                codec.mime_type,
                codec.kind
            );
        }
        ensure!(
            self.transport.enable_udp || self.transport.enable_tcp,
            "at least one of UDP and TCP must be enabled"
        );
        ensure!(
            self.transport.rtc_min_port <= self.transport.rtc_max_port,
            "rtc_min_port {} is above rtc_max_port {}",
            self.transport.rtc_min_port,
            self.transport.rtc_max_port
        );
        Ok(())
    }
}

/// Codecs every room router offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub media_codecs: Vec<RtpCodecCapability>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            media_codecs: vec![
                RtpCodecCapability::new(MediaKind::Audio, MIME_TYPE_OPUS, 48000).with_channels(2),
                RtpCodecCapability::new(MediaKind::Video, MIME_TYPE_VP8, 90000)
                    .with_parameter("x-google-start-bitrate", 1000),
            ],
        }
    }
}

/// Where transports listen and what they advertise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub listen_ip: IpAddr,
    /// Public address put into ICE candidates instead of `listen_ip`.
    pub announced_ip: Option<String>,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            announced_ip: None,
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
            rtc_min_port: 40000,
            rtc_max_port: 49999,
        }
    }
}
