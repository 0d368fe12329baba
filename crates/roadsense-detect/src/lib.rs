pub mod config;
pub mod detector;
pub mod matcher;
pub mod signature;
pub mod state_machine;
pub mod types;

pub use config::DetectorConfig;
pub use detector::{Detector, FrameOutcome};
pub use matcher::SignatureMatcher;
pub use signature::{BandSpec, Signature};
pub use state_machine::{SignatureStateMachine, StateMachineParams};
pub use types::{DetectState, DetectionEvent, DetectionScore, Direction};
