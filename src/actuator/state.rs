use crate::link::WireMessage;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use tracing::info;

pub const MIN_COMMAND: f64 = -100.0;
pub const MAX_COMMAND: f64 = 100.0;

/// Last command values applied on the robot side
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ActuatorState {
    pub speed: f64,
    pub direction: Direction,
    pub last_update: Option<DateTime<Local>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Direction {
    pub x: f64,
    pub y: f64,
}

impl ActuatorState {
    /// Applies one command, clamping every value into [-100, 100]
    pub fn apply(&mut self, message: &WireMessage) {
        match *message {
            WireMessage::Speed { value } => {
                self.speed = clamp_command(value);
                info!("Speed updated to: {}", self.speed);
            }
            WireMessage::Direction { x, y } => {
                self.direction = Direction {
                    x: clamp_command(x),
                    y: clamp_command(y),
                };
                info!(
                    "Direction updated to: x={}, y={}",
                    self.direction.x, self.direction.y
                );
            }
        }
        self.last_update = Some(Local::now());
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "speed={:.1} direction=({:.1}, {:.1})",
            self.speed, self.direction.x, self.direction.y
        )
    }
}

// NaN never reaches the motors
fn clamp_command(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(MIN_COMMAND, MAX_COMMAND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_speed_within_range() {
        let mut state = ActuatorState::default();
        state.apply(&WireMessage::Speed { value: 42.5 });
        assert_eq!(state.speed, 42.5);
        assert!(state.last_update.is_some());
    }

    #[test]
    fn clamps_out_of_range_values() {
        let mut state = ActuatorState::default();
        state.apply(&WireMessage::Speed { value: 250.0 });
        assert_eq!(state.speed, MAX_COMMAND);

        state.apply(&WireMessage::Direction { x: -180.0, y: 100.5 });
        assert_eq!(state.direction, Direction { x: -100.0, y: 100.0 });
        assert_eq!(state.speed, MAX_COMMAND);
    }

    #[test]
    fn direction_leaves_speed_untouched() {
        let mut state = ActuatorState::default();
        state.apply(&WireMessage::Speed { value: -30.0 });
        state.apply(&WireMessage::Direction { x: 10.0, y: 20.0 });
        assert_eq!(state.to_string(), "speed=-30.0 direction=(10.0, 20.0)");
    }
}
