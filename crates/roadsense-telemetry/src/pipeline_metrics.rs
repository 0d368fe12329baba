use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-thread pipeline monitoring. Every field is
/// independently readable by the excluded UI/telemetry layer; the pipeline
/// only ever increments or stores, never reads-modifies under a lock.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Audio level monitoring
    pub current_peak: Arc<AtomicI16>,   // Peak sample in current window
    pub audio_level_db: Arc<AtomicI16>, // Level in dB * 10

    // Stage counters
    pub samples_pushed: Arc<AtomicU64>,
    pub frames_assembled: Arc<AtomicU64>,
    pub frames_analyzed: Arc<AtomicU64>,
    pub frames_skipped: Arc<AtomicU64>, // malformed, skipped by the analyzer

    /// Frames lost to the bounded-latency policy. This is the read-only
    /// dropped-frame diagnostic the UI layer observes.
    pub frames_dropped: Arc<AtomicU64>,

    // Detection counters
    pub scores_emitted: Arc<AtomicU64>,
    pub events_confirmed: Arc<AtomicU64>,

    // Relay counters
    pub alerts_enqueued: Arc<AtomicU64>,
    pub alerts_delivered: Arc<AtomicU64>,
    pub alerts_retried: Arc<AtomicU64>,
    pub alerts_dropped: Arc<AtomicU64>, // exhausted retries or queue overflow
    pub session_reconnects: Arc<AtomicU64>,

    // Frame rate tracking
    pub framer_fps: Arc<AtomicU64>, // Frames per second * 10
    pub detect_fps: Arc<AtomicU64>, // Frames per second * 10

    // Activity indicators
    pub session_connected: Arc<AtomicBool>,
    pub last_event_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            current_peak: Arc::new(AtomicI16::new(0)),
            audio_level_db: Arc::new(AtomicI16::new(-900)),

            samples_pushed: Arc::new(AtomicU64::new(0)),
            frames_assembled: Arc::new(AtomicU64::new(0)),
            frames_analyzed: Arc::new(AtomicU64::new(0)),
            frames_skipped: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),

            scores_emitted: Arc::new(AtomicU64::new(0)),
            events_confirmed: Arc::new(AtomicU64::new(0)),

            alerts_enqueued: Arc::new(AtomicU64::new(0)),
            alerts_delivered: Arc::new(AtomicU64::new(0)),
            alerts_retried: Arc::new(AtomicU64::new(0)),
            alerts_dropped: Arc::new(AtomicU64::new(0)),
            session_reconnects: Arc::new(AtomicU64::new(0)),

            framer_fps: Arc::new(AtomicU64::new(0)),
            detect_fps: Arc::new(AtomicU64::new(0)),

            session_connected: Arc::new(AtomicBool::new(false)),
            last_event_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn update_audio_level(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let peak = samples.iter().map(|&s| s.abs()).max().unwrap_or(0);
        self.current_peak.store(peak, Ordering::Relaxed);

        let db = if peak > 0 {
            (20.0 * (peak as f64 / 32768.0).log10() * 10.0) as i16
        } else {
            -900
        };
        self.audio_level_db.store(db, Ordering::Relaxed);
    }

    pub fn add_samples_pushed(&self, n: u64) {
        self.samples_pushed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_frames_assembled(&self) {
        self.frames_assembled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_analyzed(&self) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_frames_dropped(&self, n: u64) {
        self.frames_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn add_scores_emitted(&self, n: u64) {
        self.scores_emitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_event_confirmed(&self) {
        self.events_confirmed.fetch_add(1, Ordering::Relaxed);
        *self.last_event_time.write() = Some(Instant::now());
    }

    pub fn increment_alerts_enqueued(&self) {
        self.alerts_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alerts_delivered(&self) {
        self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alerts_retried(&self) {
        self.alerts_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alerts_dropped(&self) {
        self.alerts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_session_reconnects(&self) {
        self.session_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_session_connected(&self, connected: bool) {
        self.session_connected.store(connected, Ordering::Relaxed);
    }

    pub fn update_framer_fps(&self, fps: f64) {
        self.framer_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn update_detect_fps(&self, fps: f64) {
        self.detect_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_level_tracks_peak() {
        let metrics = PipelineMetrics::default();
        metrics.update_audio_level(&[100, -3000, 250]);
        assert_eq!(metrics.current_peak.load(Ordering::Relaxed), 3000);
        assert!(metrics.audio_level_db.load(Ordering::Relaxed) < 0);
    }

    #[test]
    fn silence_is_floor_db() {
        let metrics = PipelineMetrics::default();
        metrics.update_audio_level(&[0, 0, 0]);
        assert_eq!(metrics.audio_level_db.load(Ordering::Relaxed), -900);
    }

    #[test]
    fn dropped_frames_accumulate() {
        let metrics = PipelineMetrics::default();
        metrics.add_frames_dropped(3);
        metrics.add_frames_dropped(2);
        assert_eq!(metrics.dropped_frames(), 5);
    }
}
