use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant as TokioInstant};

use crate::message::{AlertMessage, ControlKind, WireMessage};
use crate::queue::PendingQueue;
use crate::session::{RelayConfig, SessionState, SessionTracker};
use crate::transport::{WearableLink, WearableTransport};
use roadsense_detect::DetectionEvent;
use roadsense_foundation::RelayError;
use roadsense_telemetry::PipelineMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailureReason {
    RetriesExhausted,
    QueueOverflow,
}

/// Out-of-band notifications for the excluded UI layer: session
/// transitions and the fate of individual alerts. An alert is never
/// silently lost; every drop shows up here.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    SessionState(SessionState),
    AlertDelivered {
        id: u64,
    },
    DeliveryFailed {
        id: u64,
        signature: String,
        reason: DeliveryFailureReason,
    },
}

/// Owns the wearable session and the pending-alert queue. Consumes
/// confirmed DetectionEvents, wraps them as AlertMessages, and delivers
/// them with bounded retries over whatever link the session manager can
/// keep alive. Runs until the event channel closes, then flushes within
/// the configured grace period.
pub struct AlertRelay {
    transport: Box<dyn WearableTransport>,
    cfg: RelayConfig,
    event_rx: mpsc::Receiver<DetectionEvent>,
    notice_tx: broadcast::Sender<RelayEvent>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl AlertRelay {
    pub fn new(
        transport: Box<dyn WearableTransport>,
        cfg: RelayConfig,
        event_rx: mpsc::Receiver<DetectionEvent>,
    ) -> Self {
        let (notice_tx, _) = broadcast::channel(64);
        Self {
            transport,
            cfg,
            event_rx,
            notice_tx,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe before `spawn`; delivery failures and session transitions
    /// arrive here.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<RelayEvent> {
        self.notice_tx.subscribe()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::info!("Alert relay task started");

        let AlertRelay {
            mut transport,
            cfg,
            mut event_rx,
            notice_tx,
            metrics,
        } = self;

        let mut queue = PendingQueue::new(cfg.max_pending_alerts);
        let mut tracker = SessionTracker::new();
        let mut link: Option<Box<dyn WearableLink>> = None;
        let mut intake_open = true;
        let mut flush_deadline: Option<TokioInstant> = None;
        let mut next_heartbeat = TokioInstant::now();

        loop {
            if !intake_open {
                if queue.is_empty() {
                    break;
                }
                if flush_deadline.is_some_and(|d| TokioInstant::now() >= d) {
                    tracing::warn!(
                        pending = queue.len(),
                        "flush grace expired; abandoning pending alerts"
                    );
                    break;
                }
            }

            let Some(mut active) = link.take() else {
                // (Re)connect with capped exponential backoff, still
                // accepting events so nothing confirmed is lost meanwhile.
                tracker.begin_connect();
                emit(&notice_tx, RelayEvent::SessionState(SessionState::Connecting));

                match timeout(cfg.connect_timeout(), transport.connect()).await {
                    Ok(Ok(l)) => {
                        let reconnect = tracker.connected();
                        if let Some(m) = &metrics {
                            m.set_session_connected(true);
                            if reconnect {
                                m.increment_session_reconnects();
                            }
                        }
                        // Replay everything still pending, in id order,
                        // before any newer alert goes out.
                        queue.mark_all_unsent();
                        next_heartbeat = TokioInstant::now() + cfg.heartbeat_interval();
                        emit(&notice_tx, RelayEvent::SessionState(SessionState::Connected));
                        link = Some(l);
                    }
                    _ => {
                        tracker.connect_failed();
                        emit(
                            &notice_tx,
                            RelayEvent::SessionState(SessionState::Disconnected),
                        );
                        let delay =
                            cfg.reconnect_delay(tracker.reconnect_attempts().saturating_sub(1));
                        let mut deadline = TokioInstant::now() + delay;
                        if let Some(flush) = flush_deadline {
                            deadline = deadline.min(flush);
                        }

                        loop {
                            tokio::select! {
                                _ = sleep_until(deadline) => break,
                                event = event_rx.recv(), if intake_open => match event {
                                    Some(event) => enqueue_event(
                                        &mut queue, event, &notice_tx, &metrics,
                                    ),
                                    None => {
                                        intake_open = false;
                                        flush_deadline = Some(
                                            TokioInstant::now() + cfg.flush_grace(),
                                        );
                                        break;
                                    }
                                },
                            }
                        }
                    }
                }
                continue;
            };

            // Connected: push out everything not yet on this link, oldest
            // first.
            let mut alive = true;
            let to_send: Vec<(u64, WireMessage)> = queue
                .unsent_mut()
                .map(|p| (p.message.id, WireMessage::Alert(p.message.clone())))
                .collect();
            for (id, msg) in to_send {
                match active.send(msg).await {
                    Ok(()) => mark_sent(&mut queue, id, &metrics),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "send failed; dropping link");
                        alive = false;
                        break;
                    }
                }
            }

            if !alive {
                disconnect(&mut active, &mut tracker, &notice_tx, &metrics).await;
                continue;
            }

            let retry_at = queue
                .oldest_in_flight_mut()
                .and_then(|p| p.sent_at.map(|s| (s, p.attempts)))
                .map(|(sent, attempts)| {
                    TokioInstant::from_std(sent + cfg.retry_deadline(attempts))
                })
                .unwrap_or_else(|| TokioInstant::now() + Duration::from_secs(86_400));

            tokio::select! {
                event = event_rx.recv(), if intake_open => match event {
                    Some(event) => {
                        enqueue_event(&mut queue, event, &notice_tx, &metrics);
                    }
                    None => {
                        intake_open = false;
                        flush_deadline = Some(TokioInstant::now() + cfg.flush_grace());
                    }
                },

                incoming = active.recv() => match incoming {
                    Ok(WireMessage::Ack { ack_id }) => {
                        for message in queue.acknowledge(ack_id) {
                            if let Some(m) = &metrics {
                                m.increment_alerts_delivered();
                            }
                            emit(&notice_tx, RelayEvent::AlertDelivered { id: message.id });
                        }
                    }
                    Ok(WireMessage::Heartbeat { kind: ControlKind::Ping }) => {
                        if active.send(WireMessage::pong()).await.is_err() {
                            alive = false;
                        }
                    }
                    Ok(WireMessage::Heartbeat { kind: ControlKind::Pong }) => {
                        tracker.pong_received();
                    }
                    Ok(WireMessage::Alert(_)) => {
                        tracing::warn!("wearable sent an alert message; ignoring");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link lost");
                        alive = false;
                    }
                },

                _ = sleep_until(retry_at) => {
                    let expired = queue
                        .oldest_in_flight_mut()
                        .map(|p| (p.message.id, p.attempts, p.message.signature.clone()));
                    if let Some((id, attempts, signature)) = expired {
                        if attempts >= cfg.max_delivery_attempts {
                            queue.remove(id);
                            let err = RelayError::DeliveryExhausted { id, attempts };
                            tracing::warn!(error = %err, "dropping alert");
                            if let Some(m) = &metrics {
                                m.increment_alerts_dropped();
                            }
                            emit(&notice_tx, RelayEvent::DeliveryFailed {
                                id,
                                signature,
                                reason: DeliveryFailureReason::RetriesExhausted,
                            });
                        } else {
                            let msg = queue
                                .oldest_in_flight_mut()
                                .map(|p| WireMessage::Alert(p.message.clone()))
                                .expect("in-flight alert just observed");
                            match active.send(msg).await {
                                Ok(()) => mark_sent(&mut queue, id, &metrics),
                                Err(e) => {
                                    tracing::warn!(id, error = %e, "retry send failed");
                                    alive = false;
                                }
                            }
                        }
                    }
                },

                _ = sleep_until(next_heartbeat) => {
                    if tracker.heartbeat_due(cfg.missed_heartbeat_limit) {
                        if active.send(WireMessage::ping()).await.is_err() {
                            alive = false;
                        }
                        next_heartbeat = TokioInstant::now() + cfg.heartbeat_interval();
                    } else {
                        tracing::warn!("heartbeat budget spent; forcing reconnect");
                        alive = false;
                    }
                },
            }

            if alive {
                link = Some(active);
            } else {
                disconnect(&mut active, &mut tracker, &notice_tx, &metrics).await;
            }
        }

        if let Some(mut l) = link {
            l.close().await;
        }
        if let Some(m) = &metrics {
            m.set_session_connected(false);
        }
        tracing::info!("Alert relay task stopped");
    }
}

fn emit(notice_tx: &broadcast::Sender<RelayEvent>, event: RelayEvent) {
    // No subscribers is fine; notices are best-effort diagnostics.
    let _ = notice_tx.send(event);
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn enqueue_event(
    queue: &mut PendingQueue,
    event: DetectionEvent,
    notice_tx: &broadcast::Sender<RelayEvent>,
    metrics: &Option<Arc<PipelineMetrics>>,
) {
    let alert = AlertMessage::from_event(0, &event, unix_millis());
    let (id, evicted) = queue.enqueue(alert);
    tracing::debug!(id, signature = %event.signature, "alert enqueued");
    if let Some(m) = metrics {
        m.increment_alerts_enqueued();
    }

    if let Some(old) = evicted {
        tracing::warn!(id = old.id, "pending queue full; evicting oldest alert");
        if let Some(m) = metrics {
            m.increment_alerts_dropped();
        }
        emit(
            notice_tx,
            RelayEvent::DeliveryFailed {
                id: old.id,
                signature: old.signature,
                reason: DeliveryFailureReason::QueueOverflow,
            },
        );
    }
}

fn mark_sent(queue: &mut PendingQueue, id: u64, metrics: &Option<Arc<PipelineMetrics>>) {
    let mut was_retry = false;
    if let Some(pending) = queue.get_mut(id) {
        pending.attempts += 1;
        pending.sent_at = Some(Instant::now());
        was_retry = pending.attempts > 1;
    }
    if was_retry {
        if let Some(m) = metrics {
            m.increment_alerts_retried();
        }
    }
}

async fn disconnect(
    link: &mut Box<dyn WearableLink>,
    tracker: &mut SessionTracker,
    notice_tx: &broadcast::Sender<RelayEvent>,
    metrics: &Option<Arc<PipelineMetrics>>,
) {
    link.close().await;
    tracker.disconnected();
    if let Some(m) = metrics {
        m.set_session_connected(false);
    }
    emit(
        notice_tx,
        RelayEvent::SessionState(SessionState::Disconnected),
    );
}
