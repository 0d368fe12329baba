pub mod error;
pub mod shutdown;
pub mod state;

pub use error::{AppError, AudioError, RecoveryStrategy, RelayError};
pub use shutdown::{ShutdownGuard, ShutdownHandler};
pub use state::{PipelineState, StateManager};
