pub mod session_tests;
pub mod websocket_tests;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Level;

use conclave_client::{ClientSessionController, SessionEvent, SignalingChannel, SimulatedDevice};
use conclave_core::ServerMessage;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub const ROOM: &str = "R1";

/// A controller on a simulated device.
pub fn controller(
    channel: Arc<dyn SignalingChannel>,
) -> (Arc<ClientSessionController>, mpsc::UnboundedReceiver<SessionEvent>) {
    let (controller, events) =
        ClientSessionController::new(channel, Arc::new(SimulatedDevice::new()));
    (Arc::new(controller), events)
}

/// Starts the notification loop. Call after `join`.
pub fn start(
    controller: &Arc<ClientSessionController>,
    notifications: mpsc::UnboundedReceiver<ServerMessage>,
) {
    let controller = Arc::clone(controller);
    tokio::spawn(async move { controller.run(notifications).await });
}
