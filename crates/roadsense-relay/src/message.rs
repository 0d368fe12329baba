use serde::{Deserialize, Serialize};

use roadsense_detect::{DetectionEvent, Direction};
use roadsense_foundation::RelayError;

/// Heartbeat frames exchanged while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Ping,
    Pong,
}

/// Wire form of a confirmed detection. `id` is unique and monotonically
/// increasing per session; a wearable holding id K may assume every lower
/// id was delivered or explicitly retired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub id: u64,
    pub signature: String,
    pub confidence: f32,
    /// Unix epoch milliseconds at enqueue time.
    pub timestamp: u64,
    /// Omitted on the wire when the bearing is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl AlertMessage {
    pub fn from_event(id: u64, event: &DetectionEvent, timestamp: u64) -> Self {
        Self {
            id,
            signature: event.signature.clone(),
            confidence: event.confidence,
            timestamp,
            direction: match event.direction {
                Direction::Unknown => None,
                d => Some(d),
            },
        }
    }
}

/// Everything that crosses the wearable channel, in either direction.
/// Untagged: each variant is distinguished by its field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    /// Cumulative acknowledgment: retires every id up to and including
    /// `ack_id`.
    Ack {
        #[serde(rename = "ackId")]
        ack_id: u64,
    },
    Heartbeat {
        #[serde(rename = "type")]
        kind: ControlKind,
    },
    Alert(AlertMessage),
}

impl WireMessage {
    pub fn ping() -> Self {
        WireMessage::Heartbeat {
            kind: ControlKind::Ping,
        }
    }

    pub fn pong() -> Self {
        WireMessage::Heartbeat {
            kind: ControlKind::Pong,
        }
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, RelayError> {
        serde_json::from_str(raw).map_err(|e| RelayError::Protocol(e.to_string()))
    }
}
