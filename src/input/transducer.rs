//! Pointer-to-command transducer
//!
//! Turns the pointer events of one control surface into [`NormalizedCommand`]s.
//!
//! # Gesture lifecycle
//!
//! ```text
//!            pointer-down                 pointer-move
//!   Idle ──────────────────► Dragging ◄──────────────┐
//!    ▲ │                        │  └─────────────────┘
//!    │ │ tick (decay / snap)    │ pointer-up / cancel / leave
//!    └─┘◄───────────────────────┘
//! ```
//!
//! While dragging the knob follows the pointer, clamped to the usable radius
//! of the surface and dead-zoned per axis. Once released, every animation tick
//! pulls the knob a fixed fraction of the remaining way back to the center and
//! finally snaps it to exactly zero, emitting one zero command so the robot
//! reaches true rest.

use super::deadzone::shape;
use super::geometry::{Point, Surface};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Which projection a transducer applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Vertical travel only, reported as a single percentage
    Speed,
    /// Both axes, reported as an x/y percentage pair
    Direction,
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMode::Speed => write!(f, "speed"),
            ControlMode::Direction => write!(f, "direction"),
        }
    }
}

/// Pointer events delivered by the hosting surface, in surface-local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up,
    Cancel,
    Leave,
}

/// Control value in percent of full travel, each component within [-100, 100]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizedCommand {
    Speed(f64),
    Direction { x: f64, y: f64 },
}

impl NormalizedCommand {
    pub fn zero(mode: ControlMode) -> Self {
        match mode {
            ControlMode::Speed => NormalizedCommand::Speed(0.0),
            ControlMode::Direction => NormalizedCommand::Direction { x: 0.0, y: 0.0 },
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            NormalizedCommand::Speed(value) => value == 0.0,
            NormalizedCommand::Direction { x, y } => x == 0.0 && y == 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Dragging,
}

/// Return-to-center animation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSettings {
    /// Fraction of the remaining offset removed per tick, within (0, 1)
    pub decay_factor: f64,
    /// Per-axis step below which the knob snaps to the center
    pub snap_epsilon: f64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            decay_factor: 0.2,
            snap_epsilon: 0.1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Dead zone must be within [0, 100), got {0}")]
    DeadZoneOutOfRange(f64),

    #[error("Decay factor must be within (0, 1), got {0}")]
    DecayOutOfRange(f64),

    #[error("Snap epsilon must be positive, got {0}")]
    EpsilonOutOfRange(f64),
}

/// Per-surface gesture state machine
#[derive(Debug, Clone)]
pub struct Transducer {
    mode: ControlMode,
    dead_zone_percent: f64,
    animation: AnimationSettings,

    // Geometry, unmeasured until the first resize
    center: Point,
    max_radius: f64,

    phase: GesturePhase,
    last_valid_position: Point,
    // Set once the knob snapped to the center; ticks are no-ops until the next gesture
    resting: bool,
}

impl Transducer {
    pub fn new(
        mode: ControlMode,
        dead_zone_percent: f64,
        animation: AnimationSettings,
    ) -> Result<Self, InputError> {
        if !(0.0..100.0).contains(&dead_zone_percent) {
            return Err(InputError::DeadZoneOutOfRange(dead_zone_percent));
        }
        if !(animation.decay_factor > 0.0 && animation.decay_factor < 1.0) {
            return Err(InputError::DecayOutOfRange(animation.decay_factor));
        }
        if animation.snap_epsilon.is_nan() || animation.snap_epsilon <= 0.0 {
            return Err(InputError::EpsilonOutOfRange(animation.snap_epsilon));
        }

        debug!(
            "Creating {} transducer with {}% dead zone",
            mode, dead_zone_percent
        );
        Ok(Self {
            mode,
            dead_zone_percent,
            animation,
            center: Point::ORIGIN,
            max_radius: 0.0,
            phase: GesturePhase::Idle,
            last_valid_position: Point::ORIGIN,
            resting: true,
        })
    }

    /// Re-measures the surface; takes effect with the next pointer event
    pub fn resize(&mut self, surface: Surface) {
        self.center = surface.center();
        self.max_radius = surface.max_radius();
        debug!(
            "{} surface measured: center=({:.1}, {:.1}) radius={:.1}",
            self.mode, self.center.x, self.center.y, self.max_radius
        );
    }

    /// Dispatches a pointer event, returning the command it produced if any
    pub fn handle(&mut self, event: PointerEvent) -> Option<NormalizedCommand> {
        match event {
            PointerEvent::Down(at) => Some(self.pointer_down(at)),
            PointerEvent::Move(at) => self.pointer_move(at),
            PointerEvent::Up | PointerEvent::Cancel | PointerEvent::Leave => {
                self.release();
                None
            }
        }
    }

    /// Starts a gesture; the knob jumps to the touch point right away
    pub fn pointer_down(&mut self, at: Point) -> NormalizedCommand {
        self.phase = GesturePhase::Dragging;
        self.resting = false;
        self.track(at)
    }

    /// Follows the pointer, ignored unless a gesture is active
    pub fn pointer_move(&mut self, at: Point) -> Option<NormalizedCommand> {
        if self.phase != GesturePhase::Dragging {
            return None;
        }
        Some(self.track(at))
    }

    /// Ends the gesture; the current position seeds the return animation
    pub fn release(&mut self) {
        if self.phase == GesturePhase::Dragging {
            trace!(
                "{} released at ({:.2}, {:.2})",
                self.mode,
                self.last_valid_position.x,
                self.last_valid_position.y
            );
            self.phase = GesturePhase::Idle;
        }
    }

    /// Advances the return-to-center animation by one frame.
    ///
    /// Returns the final zero command on the frame the knob snaps to the
    /// center, `None` on every other frame.
    pub fn tick(&mut self) -> Option<NormalizedCommand> {
        if self.phase == GesturePhase::Dragging || self.resting {
            return None;
        }

        let step_x = -self.last_valid_position.x * self.animation.decay_factor;
        let step_y = -self.last_valid_position.y * self.animation.decay_factor;

        if step_x.abs() < self.animation.snap_epsilon && step_y.abs() < self.animation.snap_epsilon
        {
            self.last_valid_position = Point::ORIGIN;
            self.resting = true;
            debug!("{} knob back at rest", self.mode);
            return Some(NormalizedCommand::zero(self.mode));
        }

        self.last_valid_position.x += step_x;
        self.last_valid_position.y += step_y;
        None
    }

    fn track(&mut self, at: Point) -> NormalizedCommand {
        let max_radius = self.max_radius;
        if max_radius <= 0.0 {
            self.last_valid_position = Point::ORIGIN;
            return NormalizedCommand::zero(self.mode);
        }

        let speed_only = self.mode == ControlMode::Speed;
        let delta_x = if speed_only { 0.0 } else { at.x - self.center.x };
        let delta_y = at.y - self.center.y;

        let angle = delta_y.atan2(delta_x);
        let distance = delta_x.hypot(delta_y).min(max_radius);

        let mut x = angle.cos() * distance;
        let y = angle.sin() * distance;
        if speed_only {
            x = 0.0;
        }

        let position = Point::new(
            shape(x, max_radius, self.dead_zone_percent),
            shape(y, max_radius, self.dead_zone_percent),
        );
        self.last_valid_position = position;

        let command = self.command_for(position);
        trace!("{} tracked ({:.1}, {:.1}) -> {:?}", self.mode, at.x, at.y, command);
        command
    }

    fn command_for(&self, position: Point) -> NormalizedCommand {
        let x = percent(position.x / self.max_radius);
        // Screen y grows downwards, "up" must be positive
        let y = percent(-position.y / self.max_radius);
        match self.mode {
            ControlMode::Speed => NormalizedCommand::Speed(y),
            ControlMode::Direction => NormalizedCommand::Direction { x, y },
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        self.phase == GesturePhase::Dragging
    }

    /// Released and back at the center, no more frames will emit
    pub fn is_resting(&self) -> bool {
        self.resting
    }

    /// Knob offset from the center, for rendering
    pub fn knob(&self) -> Point {
        self.last_valid_position
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }
}

// Adding +0.0 turns a negative zero into a positive one
fn percent(fraction: f64) -> f64 {
    fraction * 100.0 + 0.0
}
