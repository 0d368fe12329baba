use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::pipeline::DetectProcessor;
use roadsense_audio::{AudioProducer, AudioRingBuffer, ChunkerControl, FrameChunker};
use roadsense_detect::DetectorConfig;
use roadsense_foundation::{AppError, PipelineState, StateManager};
use roadsense_relay::{AlertRelay, RelayEvent, WearableTransport};
use roadsense_telemetry::PipelineMetrics;

const AUDIO_CHANNEL_CAPACITY: usize = 128;
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Handle to the running pipeline. Dropping the returned [`AudioProducer`]
/// ends sample intake; `shutdown` unwinds the stages in order, giving the
/// relay its flush grace.
pub struct AppHandle {
    pub metrics: Arc<PipelineMetrics>,
    state: StateManager,
    config_tx: watch::Sender<DetectorConfig>,
    relay_notices: broadcast::Receiver<RelayEvent>,
    chunker_control: ChunkerControl,
    chunker_handle: JoinHandle<()>,
    detect_handle: JoinHandle<()>,
    relay_handle: JoinHandle<()>,
}

/// Wire up the three concurrent stages: ring buffer → chunker task →
/// detect task → relay task. The returned producer is the external
/// `push(samples)` surface for the audio source.
pub fn start(
    config: AppConfig,
    transport: Box<dyn WearableTransport>,
) -> Result<(AppHandle, AudioProducer), AppError> {
    config.validate().map_err(AppError::Config)?;

    let state = StateManager::new();
    let metrics = Arc::new(PipelineMetrics::default());
    let framer_cfg = config.audio.framer_config();

    // One second of buffered samples decouples the capture thread from the
    // pipeline task; beyond that the producer drops rather than grow.
    let ring_capacity = config.audio.sample_rate_hz as usize * config.audio.channels as usize;
    let (producer, consumer) = AudioRingBuffer::new(ring_capacity).split();

    let (audio_tx, audio_rx) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);
    let chunker = FrameChunker::new(consumer, audio_tx, framer_cfg.clone())
        .with_agc(config.audio.agc_config())
        .with_metrics(Arc::clone(&metrics));
    let (chunker_handle, chunker_control) = chunker.spawn();

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (config_tx, config_rx) = watch::channel(config.detector.clone());
    let detect_handle = DetectProcessor::new(
        config.detector.clone(),
        &framer_cfg,
        audio_rx,
        event_tx,
    )
    .map_err(AppError::Config)?
    .with_config_updates(config_rx)
    .with_metrics(Arc::clone(&metrics))
    .spawn();

    let relay = AlertRelay::new(transport, config.relay.tuning.clone(), event_rx)
        .with_metrics(Arc::clone(&metrics));
    let relay_notices = relay.subscribe_notices();
    let relay_handle = relay.spawn();

    state.transition(PipelineState::Listening)?;
    info!("roadsense pipeline started");

    Ok((
        AppHandle {
            metrics,
            state,
            config_tx,
            relay_notices,
            chunker_control,
            chunker_handle,
            detect_handle,
            relay_handle,
        },
        producer,
    ))
}

impl AppHandle {
    /// Session transitions and alert delivery failures, for the UI layer.
    pub fn subscribe_relay_notices(&self) -> broadcast::Receiver<RelayEvent> {
        self.relay_notices.resubscribe()
    }

    /// Swap the detector configuration between frames. An invalid snapshot
    /// is rejected and the active one stays in place.
    pub fn update_detector_config(&self, config: DetectorConfig) -> Result<(), AppError> {
        config.validate().map_err(AppError::Config)?;
        self.config_tx
            .send(config)
            .map_err(|_| AppError::Fatal("detect stage gone".into()))
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    /// App backgrounding: in-flight frames finish, then frame production
    /// pauses while the ring keeps absorbing pushes.
    pub fn suspend(&self) -> Result<(), AppError> {
        self.state.transition(PipelineState::Suspended)?;
        self.chunker_control.set_paused(true);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), AppError> {
        self.state.transition(PipelineState::Listening)?;
        self.chunker_control.set_paused(false);
        Ok(())
    }

    /// Stop the stages in pipeline order. The chunker exits first,
    /// dropping the frame channel; the detect stage drains and closes the
    /// event channel; the relay flushes pending alerts within its grace
    /// period before stopping.
    pub async fn shutdown(self) -> Result<(), AppError> {
        info!("Shutting down roadsense runtime...");
        self.state.transition(PipelineState::Stopping)?;

        self.chunker_control.stop();
        let _ = self.chunker_handle.await;
        let _ = self.detect_handle.await;
        let _ = self.relay_handle.await;

        self.state.transition(PipelineState::Stopped)?;
        info!("roadsense runtime shutdown complete");
        Ok(())
    }
}
