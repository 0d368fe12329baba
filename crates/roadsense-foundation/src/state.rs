use crate::error::AppError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of the detection pipeline as a whole. `Suspended` covers app
/// backgrounding: capture keeps its buffers but no frames are processed.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Initializing,
    Listening,
    Suspended,
    Stopping,
    Stopped,
}

pub struct StateManager {
    state: Arc<RwLock<PipelineState>>,
    state_tx: Sender<PipelineState>,
    state_rx: Receiver<PipelineState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(PipelineState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: PipelineState) -> Result<(), AppError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (PipelineState::Initializing, PipelineState::Listening)
                | (PipelineState::Listening, PipelineState::Suspended)
                | (PipelineState::Suspended, PipelineState::Listening)
                | (PipelineState::Listening, PipelineState::Stopping)
                | (PipelineState::Suspended, PipelineState::Stopping)
                | (PipelineState::Stopping, PipelineState::Stopped)
        );

        if !valid {
            return Err(AppError::Fatal(format!(
                "Invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> PipelineState {
        self.state.read().clone()
    }

    pub fn is_listening(&self) -> bool {
        *self.state.read() == PipelineState::Listening
    }

    pub fn subscribe(&self) -> Receiver<PipelineState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mgr = StateManager::new();
        mgr.transition(PipelineState::Listening).unwrap();
        mgr.transition(PipelineState::Suspended).unwrap();
        mgr.transition(PipelineState::Listening).unwrap();
        mgr.transition(PipelineState::Stopping).unwrap();
        mgr.transition(PipelineState::Stopped).unwrap();
        assert_eq!(mgr.current(), PipelineState::Stopped);
    }

    #[test]
    fn rejects_skipping_states() {
        let mgr = StateManager::new();
        assert!(mgr.transition(PipelineState::Stopped).is_err());
        assert_eq!(mgr.current(), PipelineState::Initializing);
    }

    #[test]
    fn cannot_resume_after_stopping() {
        let mgr = StateManager::new();
        mgr.transition(PipelineState::Listening).unwrap();
        mgr.transition(PipelineState::Stopping).unwrap();
        assert!(mgr.transition(PipelineState::Listening).is_err());
    }
}
