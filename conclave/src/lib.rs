pub use conclave_core::model::{PeerId, RoomId};

pub mod model {
    pub use conclave_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use conclave_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use conclave_client::*;
}
