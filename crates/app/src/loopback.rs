use tracing::info;

use roadsense_relay::{ControlKind, WearableHarness, WireMessage};

/// In-process stand-in for the wearable: acknowledges every alert and
/// answers heartbeats. Lets the full pipeline run (and be demoed) with no
/// device paired.
pub async fn run(mut harness: WearableHarness) {
    while let Some(mut link) = harness.accept().await {
        tokio::spawn(async move {
            while let Some(msg) = link.recv().await {
                match msg {
                    WireMessage::Alert(alert) => {
                        info!(
                            id = alert.id,
                            signature = %alert.signature,
                            confidence = alert.confidence,
                            direction = ?alert.direction,
                            "loopback wearable received alert"
                        );
                        link.send(WireMessage::Ack { ack_id: alert.id });
                    }
                    WireMessage::Heartbeat {
                        kind: ControlKind::Ping,
                    } => {
                        link.send(WireMessage::pong());
                    }
                    _ => {}
                }
            }
        });
    }
}
