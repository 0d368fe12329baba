use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;

use crate::config::AudioSettings;
use roadsense_audio::AudioProducer;

/// How many samples to push per block; 100 ms at 16 kHz mono.
const BLOCK_SAMPLES: usize = 1_600;

/// Streams a WAV file into the pipeline as if it were live capture,
/// pacing pushes at real time unless told otherwise. Runs on its own
/// thread; the producer's push never blocks the pipeline.
pub struct WavSource {
    handle: JoinHandle<anyhow::Result<u64>>,
}

impl WavSource {
    pub fn spawn(
        path: PathBuf,
        mut producer: AudioProducer,
        settings: &AudioSettings,
        pace: bool,
    ) -> anyhow::Result<Self> {
        let reader = hound::WavReader::open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let spec = reader.spec();

        if spec.sample_rate != settings.sample_rate_hz {
            bail!(
                "{}: sample rate {} does not match configured {} (no resampling)",
                path.display(),
                spec.sample_rate,
                settings.sample_rate_hz
            );
        }
        if spec.channels != settings.channels {
            bail!(
                "{}: {} channels but configured for {}",
                path.display(),
                spec.channels,
                settings.channels
            );
        }
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!("{}: only 16-bit integer PCM is supported", path.display());
        }

        info!(
            file = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "streaming WAV source"
        );

        let channels = spec.channels as usize;
        let sample_rate = spec.sample_rate;
        let handle = std::thread::spawn(move || -> anyhow::Result<u64> {
            let mut reader = hound::WavReader::open(&path)?;
            let block_len = BLOCK_SAMPLES * channels;
            let block_duration =
                Duration::from_secs_f64(BLOCK_SAMPLES as f64 / sample_rate as f64);

            let mut pushed: u64 = 0;
            let mut block = Vec::with_capacity(block_len);
            for sample in reader.samples::<i16>() {
                block.push(sample?);
                if block.len() == block_len {
                    pushed += producer.push(&block) as u64;
                    block.clear();
                    if pace {
                        std::thread::sleep(block_duration);
                    }
                }
            }
            if !block.is_empty() {
                pushed += producer.push(&block) as u64;
            }

            info!(samples = pushed, "WAV source finished");
            Ok(pushed)
        });

        Ok(Self { handle })
    }

    /// Wait for the file to finish streaming; returns samples pushed.
    pub fn join(self) -> anyhow::Result<u64> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("WAV source thread panicked"))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
