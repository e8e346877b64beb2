//! ECS Components
//!
//! Per-agent simulation data and the world-level clock.

pub mod agent;
pub mod world;

pub use agent::*;
pub use world::*;
