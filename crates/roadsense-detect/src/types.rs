use serde::{Deserialize, Serialize};

/// Rough bearing of a detected source, derived from inter-channel balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Unknown,
}

/// Raw per-frame, per-signature match strength. Noisy; never alerted on
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionScore {
    pub signature: String,
    pub seq: u64,
    pub score: f32,
}

/// Confirmation state of one signature's machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectState {
    #[default]
    Idle,
    Suspect,
    Confirmed,
    Cooldown,
}

/// A confirmed, debounced detection: the unit relayed to the wearable.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub signature: String,
    /// Stream time of the confirming frame, in milliseconds.
    pub timestamp_ms: u64,
    /// Mean score across the confirming run.
    pub confidence: f32,
    pub direction: Direction,
    /// Machine state at emission; always `Confirmed` for events produced
    /// by the state machine.
    pub state: DetectState,
}
