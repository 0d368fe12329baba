use serde::{Deserialize, Serialize};

use crate::signature::{BandSpec, Signature};

/// Detection thresholds and debounce timing. Values are an immutable
/// snapshot per pipeline run; hot-swapped between frames, never mid-frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Score at or above which an idle signature becomes suspect.
    pub suspect_threshold: f32,
    /// Score each of the K consecutive frames must reach to confirm.
    pub confirm_threshold: f32,
    /// Sustained-match time required to confirm, in milliseconds.
    pub confirm_ms: u32,
    /// Quiet period after a confirmed event, in milliseconds.
    pub cooldown_ms: u32,
    /// Absolute balance below which direction is reported as unknown.
    pub direction_margin: f32,
    pub signatures: Vec<Signature>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            suspect_threshold: 0.5,
            confirm_threshold: 0.8,
            confirm_ms: 200,
            cooldown_ms: 5_000,
            direction_margin: 0.2,
            signatures: default_signatures(),
        }
    }
}

impl DetectorConfig {
    /// Consecutive confirming frames required, for a given hop duration.
    pub fn confirm_frames(&self, hop_ms: f32) -> u32 {
        ((self.confirm_ms as f32 / hop_ms).ceil() as u32).max(1)
    }

    /// Cooldown length in frames, for a given hop duration.
    pub fn cooldown_frames(&self, hop_ms: f32) -> u32 {
        (self.cooldown_ms as f32 / hop_ms).ceil() as u32
    }

    /// Validate thresholds and every signature. On failure the previous
    /// snapshot stays active; nothing here is partially applied.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.suspect_threshold) {
            return Err("suspect_threshold must be in [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.confirm_threshold) {
            return Err("confirm_threshold must be in [0, 1]".into());
        }
        if self.confirm_threshold < self.suspect_threshold {
            return Err("confirm_threshold must not be below suspect_threshold".into());
        }
        if self.confirm_ms == 0 {
            return Err("confirm_ms must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.direction_margin) {
            return Err("direction_margin must be in [0, 1]".into());
        }
        let mut seen = std::collections::HashSet::new();
        for sig in &self.signatures {
            sig.validate()?;
            if !seen.insert(sig.name.as_str()) {
                return Err(format!("duplicate signature name '{}'", sig.name));
            }
        }
        Ok(())
    }

    pub fn enabled_signatures(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter().filter(|s| s.enabled)
    }
}

/// Starter templates for the three vehicle sound classes. Band magnitudes
/// assume AGC-leveled input; deployments tune these per device.
fn default_signatures() -> Vec<Signature> {
    vec![
        Signature {
            name: "siren".into(),
            enabled: true,
            bands: vec![
                BandSpec {
                    low_hz: 380.0,
                    high_hz: 420.0,
                    min_magnitude: 0.004,
                    max_magnitude: 1.0,
                    weight: 1.0,
                },
                BandSpec {
                    low_hz: 900.0,
                    high_hz: 1500.0,
                    min_magnitude: 0.002,
                    max_magnitude: 1.0,
                    weight: 0.5,
                },
            ],
            min_score: 0.4,
        },
        Signature {
            name: "horn".into(),
            enabled: true,
            bands: vec![
                BandSpec {
                    low_hz: 300.0,
                    high_hz: 500.0,
                    min_magnitude: 0.004,
                    max_magnitude: 1.0,
                    weight: 1.0,
                },
                BandSpec {
                    low_hz: 2000.0,
                    high_hz: 3500.0,
                    min_magnitude: 0.002,
                    max_magnitude: 1.0,
                    weight: 0.7,
                },
            ],
            min_score: 0.4,
        },
        Signature {
            name: "bike".into(),
            enabled: true,
            bands: vec![BandSpec {
                low_hz: 800.0,
                high_hz: 1200.0,
                min_magnitude: 0.003,
                max_magnitude: 1.0,
                weight: 1.0,
            }],
            min_score: 0.5,
        },
    ]
}
