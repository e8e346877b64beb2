//! Simulation Systems
//!
//! Per-tick systems, run in a fixed chain: perception, detection, then the
//! behavior state machine.

pub mod behavior;
pub mod detection;
pub mod perception;

pub use behavior::*;
pub use detection::*;
pub use perception::*;
