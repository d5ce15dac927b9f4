//! Robot side of the wire protocol
//!
//! Receives the two command shapes, clamps them and keeps the latest values in
//! an [`ActuatorState`] that anything on the robot can watch.

pub mod server;
pub mod state;

pub use server::{ActuatorError, ActuatorServer};
pub use state::{ActuatorState, Direction};
