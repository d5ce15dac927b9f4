//! Input side of the link: from pointer gestures to normalized commands
//!
//! - [`deadzone`] - jitter suppression near the rest position
//! - [`geometry`] - surface measurements (center, usable radius)
//! - [`transducer`] - gesture state machine with return-to-center animation
//!
//! ```text
//! PointerEvent ──► Transducer ──► NormalizedCommand
//!                     ▲   (polar clamp, dead zone per axis)
//!                   tick
//! ```

pub mod deadzone;
pub mod geometry;
pub mod transducer;

pub use deadzone::shape;
pub use geometry::{Point, Surface};
pub use transducer::{
    AnimationSettings, ControlMode, GesturePhase, InputError, NormalizedCommand, PointerEvent,
    Transducer,
};
