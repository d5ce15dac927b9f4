//! Controller subsystem: the operator side of the link
//!
//! 1. [`controller_handle`] - transducers, throttles and animation frame in one actor
//! 2. [`status`] - what the operator sees for a channel status
//! 3. [`host_script`] - stdin line protocol of the headless host
//!
//! # Architecture
//!
//! ```text
//! Host ──► ControllerHandle ──► ControlLoop ──► ChannelSender ──► robot
//!   ▲                               │
//!   └──── ControlSnapshot ◄─────────┘
//! ```

pub mod controller_handle;
pub mod host_script;
pub mod status;

pub use controller_handle::{ControlSnapshot, ControllerError, ControllerHandle, ControllerSettings};
pub use host_script::{HostCommand, ScriptError};
pub use status::{needs_manual_reconnect, StatusDisplay, StatusTone};
