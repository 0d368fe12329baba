use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::framer::{AudioFrame, FrameAssembler, FramerConfig};
use crate::gain::{AgcConfig, GainController};
use crate::ring_buffer::AudioConsumer;
use roadsense_telemetry::{FpsTracker, PipelineMetrics};

const READ_BLOCK_SAMPLES: usize = 4096;

/// Remote control for a spawned chunker: stop ends the task, pause
/// suspends frame production while the producer keeps (over)writing the
/// ring. Used for app backgrounding.
#[derive(Clone)]
pub struct ChunkerControl {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl ChunkerControl {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Pipeline-side pump: drains the sample ring, applies gain control, cuts
/// overlapping frames, and fans them out on a bounded broadcast channel.
/// Receivers that fall behind lose the oldest frames (broadcast lag), which
/// downstream accounts as dropped frames via seq gaps.
pub struct FrameChunker {
    consumer: AudioConsumer,
    output_tx: broadcast::Sender<AudioFrame>,
    cfg: FramerConfig,
    agc_cfg: AgcConfig,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl FrameChunker {
    pub fn new(
        consumer: AudioConsumer,
        output_tx: broadcast::Sender<AudioFrame>,
        cfg: FramerConfig,
    ) -> Self {
        Self {
            consumer,
            output_tx,
            cfg,
            agc_cfg: AgcConfig::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_agc(mut self, agc_cfg: AgcConfig) -> Self {
        self.agc_cfg = agc_cfg;
        self
    }

    pub fn spawn(self) -> (JoinHandle<()>, ChunkerControl) {
        let control = ChunkerControl {
            running: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(AtomicBool::new(false)),
        };

        // Ring overflow is counted in pushed (interleaved) samples.
        let samples_per_hop = self.cfg.hop * self.cfg.channels as usize;
        let mut worker = ChunkerWorker {
            consumer: self.consumer,
            output_tx: self.output_tx,
            assembler: FrameAssembler::new(self.cfg),
            agc: GainController::new(self.agc_cfg),
            samples_per_hop,
            metrics: self.metrics,
            fps_tracker: FpsTracker::new(),
        };

        let task_control = control.clone();
        let handle = tokio::spawn(async move {
            worker.run(task_control).await;
        });
        (handle, control)
    }
}

struct ChunkerWorker {
    consumer: AudioConsumer,
    output_tx: broadcast::Sender<AudioFrame>,
    assembler: FrameAssembler,
    agc: GainController,
    samples_per_hop: usize,
    metrics: Option<Arc<PipelineMetrics>>,
    fps_tracker: FpsTracker,
}

impl ChunkerWorker {
    async fn run(&mut self, control: ChunkerControl) {
        tracing::info!("Frame chunker started");
        let mut block = vec![0i16; READ_BLOCK_SAMPLES];

        while control.running.load(Ordering::SeqCst) {
            if control.is_paused() {
                // Suspended: the ring keeps absorbing pushes (dropping its
                // oldest on overflow) but no frames flow downstream.
                time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            let read = self.consumer.read(&mut block);
            if read == 0 {
                // New samples arrive every hop; polling at a fraction of the
                // hop period keeps latency low without spinning.
                time::sleep(Duration::from_millis(10)).await;
                continue;
            }

            if let Some(m) = &self.metrics {
                m.add_samples_pushed(read as u64);
                m.update_audio_level(&block[..read]);

                let overflowed = self.consumer.take_overflow_samples();
                if overflowed > 0 {
                    // Producer outran us; whole hops' worth of audio is gone.
                    m.add_frames_dropped(overflowed / self.samples_per_hop as u64);
                }
            }

            self.agc.process(&mut block[..read]);

            for frame in self.assembler.push(&block[..read]) {
                if let Some(m) = &self.metrics {
                    m.increment_frames_assembled();
                    if let Some(fps) = self.fps_tracker.tick() {
                        m.update_framer_fps(fps);
                    }
                }

                // A send fails only when no receiver exists; not an error,
                // the pipeline may still be starting up.
                if self.output_tx.send(frame).is_err() {
                    tracing::warn!("No active listeners for audio frames");
                }
            }
        }

        tracing::info!("Frame chunker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;

    fn small_cfg() -> FramerConfig {
        FramerConfig {
            frame_len: 256,
            hop: 128,
            sample_rate_hz: 16_000,
            channels: 1,
        }
    }

    fn no_agc() -> AgcConfig {
        AgcConfig {
            enabled: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn frames_flow_from_ring_to_broadcast() {
        let rb = AudioRingBuffer::new(8192);
        let (mut producer, consumer) = rb.split();
        let (tx, mut rx) = broadcast::channel::<AudioFrame>(32);

        let chunker = FrameChunker::new(consumer, tx, small_cfg()).with_agc(no_agc());
        let (handle, control) = chunker.spawn();

        producer.push(&vec![100i16; 1024]);

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(first.seq, 0);
        assert_eq!(first.samples.len(), 256);

        control.stop();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn paused_chunker_emits_nothing() {
        let rb = AudioRingBuffer::new(8192);
        let (mut producer, consumer) = rb.split();
        let (tx, mut rx) = broadcast::channel::<AudioFrame>(32);

        let chunker = FrameChunker::new(consumer, tx, small_cfg()).with_agc(no_agc());
        let (handle, control) = chunker.spawn();
        control.set_paused(true);

        producer.push(&vec![100i16; 1024]);
        let nothing =
            tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(nothing.is_err(), "frames flowed while paused");

        // Resume: the buffered samples come through.
        control.set_paused(false);
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(first.seq, 0);

        control.stop();
        let _ = handle.await;
    }
}
