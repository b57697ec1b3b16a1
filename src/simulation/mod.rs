//! Trace Simulation
//!
//! Offline replay of recorded access traces for evaluating parameter sets.

mod simulator;
mod workload;

pub use simulator::{SimulationConfig, SimulationReport, Simulator};
pub use workload::Workload;
