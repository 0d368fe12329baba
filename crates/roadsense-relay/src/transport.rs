use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::WireMessage;
use roadsense_foundation::RelayError;

/// Factory for duplex links to the paired wearable. The session manager
/// calls `connect` on every (re)connection attempt.
#[async_trait]
pub trait WearableTransport: Send {
    async fn connect(&mut self) -> Result<Box<dyn WearableLink>, RelayError>;
}

/// One live duplex connection. `recv` resolving to `Err(Disconnected)`
/// means the link is gone and a new one must be established.
#[async_trait]
pub trait WearableLink: Send {
    async fn send(&mut self, msg: WireMessage) -> Result<(), RelayError>;
    async fn recv(&mut self) -> Result<WireMessage, RelayError>;
    async fn close(&mut self);
}

/// In-process transport for tests and local development: each `connect`
/// hands the harness side a fresh [`HarnessLink`].
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<HarnessLink>,
    refuse: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

/// The "wearable" end of a [`MemoryTransport`]. Tests accept links,
/// script acks/pongs, and drop the link to simulate a disconnect.
pub struct WearableHarness {
    accept_rx: mpsc::UnboundedReceiver<HarnessLink>,
    refuse: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

pub struct HarnessLink {
    pub rx: mpsc::UnboundedReceiver<WireMessage>,
    pub tx: mpsc::UnboundedSender<WireMessage>,
}

impl HarnessLink {
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.rx.recv().await
    }

    pub fn send(&self, msg: WireMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

impl MemoryTransport {
    pub fn pair() -> (Self, WearableHarness) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let refuse = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        (
            Self {
                accept_tx,
                refuse: std::sync::Arc::clone(&refuse),
            },
            WearableHarness { accept_rx, refuse },
        )
    }
}

impl WearableHarness {
    /// Wait for the relay's next connection attempt to succeed.
    pub async fn accept(&mut self) -> Option<HarnessLink> {
        self.accept_rx.recv().await
    }

    /// Make the next `n` connection attempts fail.
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl WearableTransport for MemoryTransport {
    async fn connect(&mut self) -> Result<Box<dyn WearableLink>, RelayError> {
        use std::sync::atomic::Ordering;
        if self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return Err(RelayError::ConnectFailed("refused by harness".into()));
        }

        let (client_tx, harness_rx) = mpsc::unbounded_channel();
        let (harness_tx, client_rx) = mpsc::unbounded_channel();

        self.accept_tx
            .send(HarnessLink {
                rx: harness_rx,
                tx: harness_tx,
            })
            .map_err(|_| RelayError::ConnectFailed("harness dropped".into()))?;

        Ok(Box::new(MemoryLink {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

struct MemoryLink {
    tx: mpsc::UnboundedSender<WireMessage>,
    rx: mpsc::UnboundedReceiver<WireMessage>,
}

#[async_trait]
impl WearableLink for MemoryLink {
    async fn send(&mut self, msg: WireMessage) -> Result<(), RelayError> {
        self.tx.send(msg).map_err(|_| RelayError::Disconnected)
    }

    async fn recv(&mut self) -> Result<WireMessage, RelayError> {
        self.rx.recv().await.ok_or(RelayError::Disconnected)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_send_recv_roundtrip() {
        let (mut transport, mut harness) = MemoryTransport::pair();
        let mut link = transport.connect().await.unwrap();
        let mut server = harness.accept().await.unwrap();

        link.send(WireMessage::ping()).await.unwrap();
        assert_eq!(server.recv().await.unwrap(), WireMessage::ping());

        server.send(WireMessage::pong());
        assert_eq!(link.recv().await.unwrap(), WireMessage::pong());
    }

    #[tokio::test]
    async fn dropped_harness_link_disconnects_client() {
        let (mut transport, mut harness) = MemoryTransport::pair();
        let mut link = transport.connect().await.unwrap();
        let server = harness.accept().await.unwrap();
        drop(server);

        assert!(matches!(
            link.recv().await,
            Err(RelayError::Disconnected)
        ));
        assert!(link.send(WireMessage::ping()).await.is_err());
    }

    #[tokio::test]
    async fn refused_connects_fail_then_recover() {
        let (mut transport, harness) = MemoryTransport::pair();
        harness.refuse_next(2);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
    }
}
