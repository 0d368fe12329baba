use serde::{Deserialize, Serialize};

fn default_weight() -> f32 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// One target frequency band of a signature: the magnitude observed across
/// `[low_hz, high_hz]` is expected inside `[min_magnitude, max_magnitude]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandSpec {
    pub low_hz: f32,
    pub high_hz: f32,
    pub min_magnitude: f32,
    pub max_magnitude: f32,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl BandSpec {
    pub fn contains(&self, magnitude: f32) -> bool {
        magnitude >= self.min_magnitude && magnitude <= self.max_magnitude
    }
}

/// Named acoustic template. Configured, not computed; validated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub bands: Vec<BandSpec>,
    /// Scores below this floor are reported as 0.0; a weak partial match
    /// carries no information worth accumulating.
    #[serde(default)]
    pub min_score: f32,
}

impl Signature {
    /// Reject malformed definitions at load time. The caller keeps its
    /// previous configuration when this fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("signature name must not be empty".into());
        }
        if self.bands.is_empty() {
            return Err(format!("signature '{}' has no bands", self.name));
        }
        for (i, band) in self.bands.iter().enumerate() {
            if band.low_hz < 0.0 || band.high_hz <= band.low_hz {
                return Err(format!(
                    "signature '{}' band {}: invalid frequency span {}..{}",
                    self.name, i, band.low_hz, band.high_hz
                ));
            }
            if band.min_magnitude < 0.0 || band.max_magnitude < band.min_magnitude {
                return Err(format!(
                    "signature '{}' band {}: invalid magnitude range {}..{}",
                    self.name, i, band.min_magnitude, band.max_magnitude
                ));
            }
            if band.weight <= 0.0 {
                return Err(format!(
                    "signature '{}' band {}: weight must be positive",
                    self.name, i
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(format!(
                "signature '{}': min_score must be in [0, 1]",
                self.name
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(low: f32, high: f32) -> BandSpec {
        BandSpec {
            low_hz: low,
            high_hz: high,
            min_magnitude: 0.01,
            max_magnitude: 1.0,
            weight: 1.0,
        }
    }

    #[test]
    fn valid_signature_passes() {
        let sig = Signature {
            name: "siren".into(),
            enabled: true,
            bands: vec![band(380.0, 420.0), band(700.0, 900.0)],
            min_score: 0.0,
        };
        assert!(sig.validate().is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let sig = Signature {
            name: "  ".into(),
            enabled: true,
            bands: vec![band(380.0, 420.0)],
            min_score: 0.0,
        };
        assert!(sig.validate().is_err());
    }

    #[test]
    fn inverted_band_rejected() {
        let sig = Signature {
            name: "horn".into(),
            enabled: true,
            bands: vec![band(420.0, 380.0)],
            min_score: 0.0,
        };
        assert!(sig.validate().is_err());
    }

    #[test]
    fn bad_magnitude_range_rejected() {
        let mut b = band(380.0, 420.0);
        b.max_magnitude = 0.001;
        let sig = Signature {
            name: "horn".into(),
            enabled: true,
            bands: vec![b],
            min_score: 0.0,
        };
        assert!(sig.validate().is_err());
    }

    #[test]
    fn no_bands_rejected() {
        let sig = Signature {
            name: "bike".into(),
            enabled: true,
            bands: vec![],
            min_score: 0.0,
        };
        assert!(sig.validate().is_err());
    }
}
