use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use roadsense_audio::{AgcConfig, FramerConfig};
use roadsense_detect::DetectorConfig;
use roadsense_relay::RelayConfig;

/// Frame geometry and gain control for the capture front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate_hz: u32,
    /// 1 (mono) or 2 (interleaved stereo; enables direction estimation).
    pub channels: u16,
    /// Window length N in samples.
    pub frame_len: usize,
    /// Hop H in samples; H < N overlaps successive windows.
    pub hop: usize,
    pub agc_enabled: bool,
    pub agc_target_rms: f32,
    pub agc_max_gain: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
            frame_len: 1280, // 80 ms
            hop: 640,        // 40 ms, 50% overlap
            agc_enabled: true,
            agc_target_rms: 0.25,
            agc_max_gain: 8.0,
        }
    }
}

impl AudioSettings {
    pub fn framer_config(&self) -> FramerConfig {
        FramerConfig {
            frame_len: self.frame_len,
            hop: self.hop,
            sample_rate_hz: self.sample_rate_hz,
            channels: self.channels,
        }
    }

    pub fn agc_config(&self) -> AgcConfig {
        AgcConfig {
            enabled: self.agc_enabled,
            target_rms: self.agc_target_rms,
            max_gain: self.agc_max_gain,
            window_samples: self.sample_rate_hz as usize,
        }
    }
}

/// Wearable endpoint plus relay tuning, flattened into one `[relay]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// WebSocket URL of the wearable bridge. When absent the binary runs
    /// with an in-process loopback wearable.
    pub url: Option<String>,
    #[serde(flatten)]
    pub tuning: RelayConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioSettings,
    pub detector: DetectorConfig,
    pub relay: RelaySettings,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .map_err(|e| anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.audio.framer_config().validate()?;
        self.detector.validate()?;
        self.relay.tuning.validate()?;
        Ok(())
    }
}
