use crate::input::NormalizedCommand;
use serde::{Deserialize, Serialize};

/// Outbound wire format understood by the robot
///
/// ```json
/// {"type":"speed","value":42.0}
/// {"type":"direction","x":-10.5,"y":80.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Speed { value: f64 },
    Direction { x: f64, y: f64 },
}

impl WireMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<NormalizedCommand> for WireMessage {
    fn from(command: NormalizedCommand) -> Self {
        match command {
            NormalizedCommand::Speed(value) => WireMessage::Speed { value },
            NormalizedCommand::Direction { x, y } => WireMessage::Direction { x, y },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn speed_wire_shape() {
        let message = WireMessage::from(NormalizedCommand::Speed(42.5));
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "speed", "value": 42.5}));
    }

    #[test]
    fn direction_wire_shape() {
        let message = WireMessage::from(NormalizedCommand::Direction { x: -10.0, y: 80.0 });
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "direction", "x": -10.0, "y": 80.0}));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let parsed = serde_json::from_str::<WireMessage>(r#"{"type":"turbo","value":1}"#);
        assert!(parsed.is_err());
    }
}
