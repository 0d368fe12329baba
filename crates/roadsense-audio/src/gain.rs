/// Automatic gain control over a rolling RMS window.
///
/// Road-side capture levels vary wildly between devices; the matcher's band
/// ranges assume a roughly stable level. The controller tracks RMS over a
/// fixed window and nudges its gain toward `target_rms` once per window,
/// clamped to `[1.0, max_gain]`. Samples saturate at i16 range.
#[derive(Debug, Clone)]
pub struct AgcConfig {
    pub enabled: bool,
    /// Desired RMS as a fraction of full scale.
    pub target_rms: f32,
    pub max_gain: f32,
    /// RMS measurement window, in samples.
    pub window_samples: usize,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_rms: 0.25,
            max_gain: 8.0,
            window_samples: 16_000, // one second at the default rate
        }
    }
}

pub struct GainController {
    cfg: AgcConfig,
    gain: f32,
    sum_squares: f64,
    window_count: usize,
}

impl GainController {
    pub fn new(cfg: AgcConfig) -> Self {
        Self {
            cfg,
            gain: 1.0,
            sum_squares: 0.0,
            window_count: 0,
        }
    }

    pub fn current_gain(&self) -> f32 {
        self.gain
    }

    /// Apply the current gain in place and update the RMS window.
    pub fn process(&mut self, samples: &mut [i16]) {
        if !self.cfg.enabled {
            return;
        }

        for sample in samples.iter_mut() {
            let amplified = (*sample as f32 * self.gain).clamp(-32768.0, 32767.0);
            *sample = amplified as i16;

            let normalized = amplified as f64 / 32768.0;
            self.sum_squares += normalized * normalized;
            self.window_count += 1;

            if self.window_count >= self.cfg.window_samples {
                self.adjust();
            }
        }
    }

    fn adjust(&mut self) {
        let rms = (self.sum_squares / self.window_count as f64).sqrt() as f32;
        self.sum_squares = 0.0;
        self.window_count = 0;

        if rms <= 1e-6 {
            // Silence tells us nothing about level; hold the gain.
            return;
        }

        let desired = (self.cfg.target_rms / rms) * self.gain;
        self.gain = desired.clamp(1.0, self.cfg.max_gain);
        tracing::debug!(rms, gain = self.gain, "AGC window adjusted");
    }
}
