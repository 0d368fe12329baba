use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use roadsense_audio::{AudioFrame, FramerConfig};
use roadsense_detect::{Detector, DetectorConfig, DetectionEvent};
use roadsense_dsp::{SpectralAnalyzer, SpectralError};
use roadsense_foundation::AudioError;
use roadsense_telemetry::{FpsTracker, PipelineMetrics};

/// Stage (b) of the pipeline: drains frames in sequence order through the
/// spectral analyzer, signature matcher, and per-signature state machines,
/// forwarding confirmed events to the relay. Single-threaded, because
/// the consecutive-match invariant requires in-order processing.
pub struct DetectProcessor {
    audio_rx: broadcast::Receiver<AudioFrame>,
    event_tx: mpsc::Sender<DetectionEvent>,
    analyzer: SpectralAnalyzer,
    detector: Detector,
    frame_duration_ms: u64,
    config_rx: Option<watch::Receiver<DetectorConfig>>,
    metrics: Option<Arc<PipelineMetrics>>,
    last_seq: Option<u64>,
    frames_processed: u64,
    events_generated: u64,
    fps_tracker: FpsTracker,
}

impl DetectProcessor {
    pub fn new(
        detector_cfg: DetectorConfig,
        framer_cfg: &FramerConfig,
        audio_rx: broadcast::Receiver<AudioFrame>,
        event_tx: mpsc::Sender<DetectionEvent>,
    ) -> Result<Self, String> {
        let analyzer = SpectralAnalyzer::new(framer_cfg.sample_rate_hz, framer_cfg.frame_len);
        let detector = Detector::new(detector_cfg, framer_cfg.hop_duration_ms())?;
        let frame_duration_ms =
            framer_cfg.frame_len as u64 * 1000 / framer_cfg.sample_rate_hz as u64;

        Ok(Self {
            audio_rx,
            event_tx,
            analyzer,
            detector,
            frame_duration_ms,
            config_rx: None,
            metrics: None,
            last_seq: None,
            frames_processed: 0,
            events_generated: 0,
            fps_tracker: FpsTracker::new(),
        })
    }

    /// Receive configuration snapshots to apply between frames.
    pub fn with_config_updates(mut self, rx: watch::Receiver<DetectorConfig>) -> Self {
        self.config_rx = Some(rx);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Detect processor task started");

        loop {
            match self.audio_rx.recv().await {
                Ok(frame) => self.process_frame(frame).await,
                Err(RecvError::Lagged(n)) => {
                    // The broadcast ring evicted frames we never saw;
                    // recorded here, surfaced via the dropped-frame counter.
                    warn!(lost = n, "detect stage lagged; frames dropped");
                    if let Some(m) = &self.metrics {
                        m.add_frames_dropped(n);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!(
            "Detect processor shutting down. Frames processed: {}, events generated: {}",
            self.frames_processed, self.events_generated
        );
    }

    async fn process_frame(&mut self, frame: AudioFrame) {
        // Snapshots apply only on frame boundaries.
        self.apply_config_update();

        if let Some(last) = self.last_seq {
            if frame.seq > last + 1 {
                debug!(
                    from = last,
                    to = frame.seq,
                    "sequence gap (frames already counted as dropped)"
                );
            }
        }
        self.last_seq = Some(frame.seq);

        match self.analyzer.analyze(&frame.samples, frame.seq) {
            Ok(spectrum) => {
                // Events are stamped with the stream time at which the
                // confirming frame *ends*, the moment of confirmation.
                let confirmed_at = frame.timestamp_ms + self.frame_duration_ms;
                let outcome =
                    self.detector
                        .process_frame(&spectrum, frame.balance, confirmed_at);

                if let Some(m) = &self.metrics {
                    m.increment_frames_analyzed();
                    m.add_scores_emitted(outcome.scores.len() as u64);
                    if let Some(fps) = self.fps_tracker.tick() {
                        m.update_detect_fps(fps);
                    }
                }

                for event in outcome.events {
                    self.events_generated += 1;
                    info!(
                        signature = %event.signature,
                        confidence = event.confidence,
                        direction = ?event.direction,
                        timestamp_ms = event.timestamp_ms,
                        "detection confirmed"
                    );
                    if let Some(m) = &self.metrics {
                        m.record_event_confirmed();
                    }
                    if self.event_tx.send(event).await.is_err() {
                        error!("Failed to send detection event: relay gone");
                    }
                }
            }
            Err(SpectralError::BadFrameLength { expected, got }) => {
                // Fatal to this frame only; the pipeline keeps running.
                let err = AudioError::BadFrameLength { expected, got };
                warn!(seq = frame.seq, error = %err, "frame analysis failed, skipping");
                if let Some(m) = &self.metrics {
                    m.increment_frames_skipped();
                }
            }
        }

        self.frames_processed += 1;
        if self.frames_processed % 1000 == 0 {
            debug!(
                frames = self.frames_processed,
                events = self.events_generated,
                "detect processor heartbeat"
            );
        }
    }

    fn apply_config_update(&mut self) {
        let Some(rx) = &mut self.config_rx else {
            return;
        };
        if rx.has_changed().unwrap_or(false) {
            let snapshot = rx.borrow_and_update().clone();
            match self.detector.swap_config(snapshot) {
                Ok(()) => info!("detector configuration updated"),
                // Previous snapshot stays active.
                Err(e) => warn!(error = %e, "rejected detector configuration"),
            }
        }
    }
}
