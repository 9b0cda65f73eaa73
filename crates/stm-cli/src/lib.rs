//! State tree migration simulator
//!
//! Library side of the `stm` binary: seeded synthetic trees, a V2 → V3
//! registry and a post-migration checker.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod simulator;

pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, Violation};
