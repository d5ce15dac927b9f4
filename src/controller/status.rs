use crate::link::ChannelStatus;
use serde::Serialize;
use std::fmt;

/// Color class of the connection indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Connected,
    Reconnecting,
    Disconnected,
}

impl StatusTone {
    pub fn color(&self) -> &'static str {
        match self {
            StatusTone::Connected => "#4CAF50",
            StatusTone::Reconnecting => "#FFA726",
            StatusTone::Disconnected => "#F44336",
        }
    }
}

/// What the operator sees for a given channel status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub message: String,
    pub tone: StatusTone,
    /// Whether to offer the manual reconnect action
    pub offer_reconnect: bool,
}

impl From<&ChannelStatus> for StatusDisplay {
    fn from(status: &ChannelStatus) -> Self {
        let (message, tone) = if status.connected {
            ("Connected".to_string(), StatusTone::Connected)
        } else if status.reconnecting {
            (
                status
                    .error
                    .clone()
                    .unwrap_or_else(|| "Reconnecting...".to_string()),
                StatusTone::Reconnecting,
            )
        } else {
            (
                status
                    .error
                    .clone()
                    .unwrap_or_else(|| "Disconnected".to_string()),
                StatusTone::Disconnected,
            )
        };

        Self {
            message,
            tone,
            offer_reconnect: needs_manual_reconnect(status),
        }
    }
}

impl fmt::Display for StatusDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tone.color(), self.message)
    }
}

/// Neither connected nor on the way there
pub fn needs_manual_reconnect(status: &ChannelStatus) -> bool {
    !status.connected && !status.reconnecting
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(connected: bool, reconnecting: bool, error: Option<&str>) -> ChannelStatus {
        ChannelStatus {
            connected,
            reconnecting,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn connected_is_green() {
        let display = StatusDisplay::from(&ChannelStatus::connected());
        assert_eq!(display.message, "Connected");
        assert_eq!(display.tone.color(), "#4CAF50");
        assert!(!display.offer_reconnect);
    }

    #[test]
    fn reconnecting_shows_attempt() {
        let display = StatusDisplay::from(&status(
            false,
            true,
            Some("Reconnecting... (Attempt 2/5)"),
        ));
        assert_eq!(display.message, "Reconnecting... (Attempt 2/5)");
        assert_eq!(display.tone, StatusTone::Reconnecting);
        assert!(!display.offer_reconnect);

        let bare = StatusDisplay::from(&status(false, true, None));
        assert_eq!(bare.message, "Reconnecting...");
    }

    #[test]
    fn idle_offers_reconnect() {
        let exhausted = StatusDisplay::from(&status(
            false,
            false,
            Some("Max reconnection attempts reached"),
        ));
        assert_eq!(exhausted.message, "Max reconnection attempts reached");
        assert_eq!(exhausted.tone.color(), "#F44336");
        assert!(exhausted.offer_reconnect);

        let idle = StatusDisplay::from(&ChannelStatus::default());
        assert_eq!(idle.message, "Disconnected");
        assert!(idle.offer_reconnect);
    }
}
