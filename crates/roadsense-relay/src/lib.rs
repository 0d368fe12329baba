pub mod message;
pub mod queue;
pub mod relay;
pub mod session;
pub mod transport;
pub mod ws;

pub use message::{AlertMessage, ControlKind, WireMessage};
pub use queue::{PendingAlert, PendingQueue};
pub use relay::{AlertRelay, DeliveryFailureReason, RelayEvent};
pub use session::{RelayConfig, SessionState, SessionTracker};
pub use transport::{HarnessLink, MemoryTransport, WearableHarness, WearableLink, WearableTransport};
pub use ws::WsTransport;
