use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio pipeline error: {0}")]
    Audio(#[from] AudioError),

    #[error("Alert relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    /// The pipeline fell behind the capture source and frames were discarded.
    #[error("Capture overrun, dropped {dropped} frames")]
    CaptureOverrun { dropped: u64 },

    /// A frame of unexpected length reached the analyzer. Fatal to that
    /// frame only.
    #[error("Malformed frame: expected {expected} samples, got {got}")]
    BadFrameLength { expected: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Channel to wearable disconnected")]
    Disconnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Alert {id} dropped after {attempts} delivery attempts")]
    DeliveryExhausted { id: u64, attempts: u32 },

    #[error("Wire protocol violation: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: u32, delay: Duration },
    Degrade,
    Restart,
    Ignore,
    Fatal,
}

impl AppError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            AppError::Audio(AudioError::CaptureOverrun { .. }) => RecoveryStrategy::Ignore,
            AppError::Audio(AudioError::BadFrameLength { .. }) => RecoveryStrategy::Ignore,
            AppError::Relay(RelayError::Disconnected)
            | AppError::Relay(RelayError::ConnectFailed(_))
            | AppError::Relay(RelayError::Transport(_)) => RecoveryStrategy::Retry {
                max_attempts: u32::MAX,
                delay: Duration::from_secs(1),
            },
            AppError::Relay(RelayError::DeliveryExhausted { .. }) => RecoveryStrategy::Degrade,
            AppError::Config(_) => RecoveryStrategy::Degrade,
            AppError::Fatal(_) | AppError::ShutdownRequested => RecoveryStrategy::Fatal,
            _ => RecoveryStrategy::Restart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overruns_are_ignored() {
        let err = AppError::Audio(AudioError::CaptureOverrun { dropped: 12 });
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Ignore));
    }

    #[test]
    fn disconnects_retry_forever() {
        let err = AppError::Relay(RelayError::Disconnected);
        match err.recovery_strategy() {
            RecoveryStrategy::Retry { max_attempts, .. } => {
                assert_eq!(max_attempts, u32::MAX)
            }
            other => panic!("expected Retry, got {:?}", other),
        }
    }

    #[test]
    fn exhausted_delivery_degrades() {
        let err = AppError::Relay(RelayError::DeliveryExhausted { id: 7, attempts: 3 });
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Degrade));
    }
}
