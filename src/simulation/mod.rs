//! Field node simulation.
//!
//! - `types`: node record, crop and irrigation enums, sensor bounds
//! - `simulator`: time evolution of the fleet and the irrigation controller

pub mod simulator;
pub mod types;

pub use simulator::NodeSimulator;
pub use types::NODE_COUNT;
