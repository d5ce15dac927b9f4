//! Outbound side: from normalized commands to frames on the robot socket
//!
//! ```text
//! NormalizedCommand ─► WireMessage ─► Throttle ─► ChannelSender ─► driver ─► Link
//!                                                       ▲                     │
//!                                                 ChannelStatus ◄─────────────┘
//! ```
//!
//! - [`message`] - the two command shapes as JSON
//! - [`throttle`] - latest-wins coalescing of bursts
//! - [`channel`] - socket lifecycle, status and bounded reconnection
//! - [`transport`] - the `Connector` seam and its WebSocket implementation

pub mod channel;
pub mod message;
pub mod throttle;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelSender, ChannelSettings, ChannelStatus, ResilientChannel, SendError};
pub use message::WireMessage;
pub use throttle::{Throttle, DEFAULT_WINDOW};
pub use transport::{
    CloseInfo, Connector, Link, LinkWriter, TransportError, TransportEvent, WsConnector,
};
