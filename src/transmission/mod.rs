//! Ground-to-satellite transmission: packet codec and per-node scheduler.

pub mod payload;
pub mod scheduler;

pub use scheduler::LoRaTransmitter;
