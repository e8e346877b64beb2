//! Shared Services
//!
//! World-level buses the agents communicate through: the noise bus and the
//! alert relay.

pub mod alert;
pub mod noise;

pub use alert::*;
pub use noise::*;
