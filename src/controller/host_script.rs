//! Line protocol spoken on stdin by the headless host
//!
//! ```text
//! resize direction 200 200 60
//! down direction 150 100
//! move direction 170 60
//! up direction
//! reconnect
//! ```

use crate::input::{ControlMode, Point, PointerEvent, Surface};

/// Knob diameter assumed when a resize line leaves it out
pub const DEFAULT_KNOB_DIAMETER: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Resize {
        control: ControlMode,
        surface: Surface,
    },
    Pointer {
        control: ControlMode,
        event: PointerEvent,
    },
    Disconnect,
    Reconnect,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScriptError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown control '{0}', expected speed or direction")]
    UnknownControl(String),

    #[error("'{command}' expects {expected}")]
    Arity {
        command: String,
        expected: &'static str,
    },

    #[error("Not a number: {0}")]
    InvalidNumber(String),
}

impl HostCommand {
    /// Parses one line; blank lines and `#` comments yield `Ok(None)`
    pub fn parse(line: &str) -> Result<Option<Self>, ScriptError> {
        let line = line.split('#').next().unwrap_or_default().trim();
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb {
            "disconnect" => no_args(verb, &args, HostCommand::Disconnect)?,
            "reconnect" => no_args(verb, &args, HostCommand::Reconnect)?,
            "quit" | "exit" => no_args(verb, &args, HostCommand::Quit)?,
            "resize" => {
                let (control, rest) = split_control(verb, &args, "<control> <width> <height> [knob]")?;
                let surface = match rest {
                    [w, h] => Surface::new(number(w)?, number(h)?, DEFAULT_KNOB_DIAMETER),
                    [w, h, knob] => Surface::new(number(w)?, number(h)?, number(knob)?),
                    _ => return Err(arity(verb, "<control> <width> <height> [knob]")),
                };
                HostCommand::Resize { control, surface }
            }
            "down" | "move" => {
                let (control, rest) = split_control(verb, &args, "<control> <x> <y>")?;
                let [x, y] = rest else {
                    return Err(arity(verb, "<control> <x> <y>"));
                };
                let at = Point::new(number(x)?, number(y)?);
                let event = if verb == "down" {
                    PointerEvent::Down(at)
                } else {
                    PointerEvent::Move(at)
                };
                HostCommand::Pointer { control, event }
            }
            "up" | "cancel" | "leave" => {
                let (control, rest) = split_control(verb, &args, "<control>")?;
                if !rest.is_empty() {
                    return Err(arity(verb, "<control>"));
                }
                let event = match verb {
                    "up" => PointerEvent::Up,
                    "cancel" => PointerEvent::Cancel,
                    _ => PointerEvent::Leave,
                };
                HostCommand::Pointer { control, event }
            }
            other => return Err(ScriptError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn no_args(verb: &str, args: &[&str], command: HostCommand) -> Result<HostCommand, ScriptError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(arity(verb, "no arguments"))
    }
}

fn split_control<'a>(
    verb: &str,
    args: &'a [&'a str],
    expected: &'static str,
) -> Result<(ControlMode, &'a [&'a str]), ScriptError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(arity(verb, expected));
    };
    let control = match *first {
        "speed" => ControlMode::Speed,
        "direction" => ControlMode::Direction,
        other => return Err(ScriptError::UnknownControl(other.to_string())),
    };
    Ok((control, rest))
}

fn number(word: &str) -> Result<f64, ScriptError> {
    word.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ScriptError::InvalidNumber(word.to_string()))
}

fn arity(verb: &str, expected: &'static str) -> ScriptError {
    ScriptError::Arity {
        command: verb.to_string(),
        expected,
    }
}
