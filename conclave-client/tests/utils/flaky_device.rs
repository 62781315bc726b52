use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use conclave_client::{ClientError, LocalTrack, MediaDevice, RemoteTrack, SimulatedDevice};
use conclave_core::{
    ConsumerDescriptor, Direction, DtlsParameters, RtpCapabilities, RtpParameters,
    TransportParams,
};

/// A [`SimulatedDevice`] whose first `failures` loads fail.
pub struct FlakyDevice {
    inner: SimulatedDevice,
    failures: AtomicUsize,
}

impl FlakyDevice {
    pub fn failing_loads(failures: usize) -> Self {
        Self {
            inner: SimulatedDevice::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl MediaDevice for FlakyDevice {
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), ClientError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Device("codec probe failed".to_owned()));
        }
        self.inner.load(router_capabilities).await
    }

    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.inner.rtp_capabilities()
    }

    async fn open_transport(
        &self,
        direction: Direction,
        params: &TransportParams,
    ) -> Result<DtlsParameters, ClientError> {
        self.inner.open_transport(direction, params).await
    }

    async fn produce(&self, track: &LocalTrack) -> Result<RtpParameters, ClientError> {
        self.inner.produce(track).await
    }

    async fn consume(&self, consumer: &ConsumerDescriptor) -> Result<RemoteTrack, ClientError> {
        self.inner.consume(consumer).await
    }
}
