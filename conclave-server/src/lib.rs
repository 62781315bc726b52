mod config;
mod engine;
mod error;
mod room;
mod signaling;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use room::*;
pub use signaling::*;
