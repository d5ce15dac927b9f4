//! Real-time remote-control link for a robot
//!
//! Pointer drags on two control surfaces (speed and direction) become
//! dead-zoned, auto-centering percentages that are streamed as JSON over a
//! WebSocket which reconnects on its own after unexpected loss.
//!
//! - [`input`] - pointer gestures to normalized commands
//! - [`link`] - throttling, wire format and the resilient channel
//! - [`controller`] - composition root for the operator side
//! - [`actuator`] - the robot side of the wire protocol
//! - [`schedule`] - cancelable timers shared by all of the above
//! - [`config`] - TOML configuration

pub mod actuator;
pub mod config;
pub mod controller;
pub mod input;
pub mod link;
pub mod schedule;
