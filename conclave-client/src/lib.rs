mod channel;
mod controller;
mod device;
mod error;
mod streams;

pub use channel::*;
pub use controller::*;
pub use device::*;
pub use error::*;
pub use streams::*;
