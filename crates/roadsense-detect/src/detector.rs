use std::collections::HashMap;

use roadsense_dsp::SpectralFrame;

use crate::config::DetectorConfig;
use crate::matcher::SignatureMatcher;
use crate::state_machine::{SignatureStateMachine, StateMachineParams};
use crate::types::{DetectState, DetectionEvent, DetectionScore};

/// Everything one frame produced: the raw scores (diagnostics) and any
/// confirmed events (for the relay).
#[derive(Debug, Default)]
pub struct FrameOutcome {
    pub scores: Vec<DetectionScore>,
    pub events: Vec<DetectionEvent>,
}

/// Matcher plus one independent state machine per enabled signature.
/// Signatures never interfere with each other; several may be suspect or
/// cooling down at once.
pub struct Detector {
    cfg: DetectorConfig,
    hop_ms: f32,
    matcher: SignatureMatcher,
    machines: HashMap<String, SignatureStateMachine>,
}

impl Detector {
    pub fn new(cfg: DetectorConfig, hop_ms: f32) -> Result<Self, String> {
        cfg.validate()?;
        let matcher = SignatureMatcher::new(cfg.enabled_signatures().cloned());
        let machines = Self::build_machines(&cfg, hop_ms, HashMap::new());
        Ok(Self {
            cfg,
            hop_ms,
            matcher,
            machines,
        })
    }

    /// Process one spectral frame in sequence order.
    pub fn process_frame(
        &mut self,
        spectrum: &SpectralFrame,
        balance: f32,
        timestamp_ms: u64,
    ) -> FrameOutcome {
        let scores = self.matcher.match_frame(spectrum);
        let mut events = Vec::new();

        for score in &scores {
            if let Some(machine) = self.machines.get_mut(&score.signature) {
                if let Some(event) = machine.process(score.score, balance, timestamp_ms) {
                    events.push(event);
                }
            }
        }

        FrameOutcome { scores, events }
    }

    /// Swap in a new configuration snapshot between frames. Machines for
    /// signatures that survive the swap keep their state; invalid
    /// configurations are rejected and the active one stays in place.
    pub fn swap_config(&mut self, cfg: DetectorConfig) -> Result<(), String> {
        cfg.validate()?;
        let old_machines = std::mem::take(&mut self.machines);
        self.matcher = SignatureMatcher::new(cfg.enabled_signatures().cloned());
        self.machines = Self::build_machines(&cfg, self.hop_ms, old_machines);
        self.cfg = cfg;
        tracing::info!(
            signatures = self.machines.len(),
            "detector configuration swapped"
        );
        Ok(())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn state_of(&self, signature: &str) -> Option<DetectState> {
        self.machines.get(signature).map(|m| m.current_state())
    }

    pub fn reset(&mut self) {
        for machine in self.machines.values_mut() {
            machine.reset();
        }
    }

    fn build_machines(
        cfg: &DetectorConfig,
        hop_ms: f32,
        mut previous: HashMap<String, SignatureStateMachine>,
    ) -> HashMap<String, SignatureStateMachine> {
        let mut machines = HashMap::new();
        for sig in cfg.enabled_signatures() {
            let machine = previous.remove(&sig.name).unwrap_or_else(|| {
                SignatureStateMachine::new(
                    sig.name.clone(),
                    StateMachineParams {
                        suspect_threshold: cfg.suspect_threshold,
                        confirm_threshold: cfg.confirm_threshold,
                        confirm_frames: cfg.confirm_frames(hop_ms),
                        cooldown_frames: cfg.cooldown_frames(hop_ms),
                        direction_margin: cfg.direction_margin,
                    },
                )
            });
            machines.insert(sig.name.clone(), machine);
        }
        machines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{BandSpec, Signature};

    fn test_config() -> DetectorConfig {
        DetectorConfig {
            suspect_threshold: 0.5,
            confirm_threshold: 0.8,
            confirm_ms: 120,
            cooldown_ms: 400,
            direction_margin: 0.2,
            signatures: vec![Signature {
                name: "siren".into(),
                enabled: true,
                bands: vec![BandSpec {
                    low_hz: 395.0,
                    high_hz: 405.0,
                    min_magnitude: 0.01,
                    max_magnitude: 1.0,
                    weight: 1.0,
                }],
                min_score: 0.0,
            }],
        }
    }

    fn spectrum(seq: u64, peak_hz: f32, magnitude: f32) -> SpectralFrame {
        let bin_width = 16_000.0 / 2048.0;
        let mut magnitudes = vec![0.0f32; 1025];
        let k = (peak_hz / bin_width).round() as usize;
        magnitudes[k] = magnitude;
        SpectralFrame {
            seq,
            sample_rate_hz: 16_000,
            bin_width_hz: bin_width,
            magnitudes,
        }
    }

    #[test]
    fn sustained_tone_confirms_exactly_once() {
        // 120 ms confirm at 40 ms hop: K = 3.
        let mut detector = Detector::new(test_config(), 40.0).unwrap();

        let mut events = Vec::new();
        for seq in 0..10 {
            let outcome =
                detector.process_frame(&spectrum(seq, 400.0, 0.1), 0.0, seq * 40);
            assert_eq!(outcome.scores.len(), 1);
            events.extend(outcome.events);
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signature, "siren");
        assert_eq!(events[0].timestamp_ms, 80);
        assert_eq!(
            detector.state_of("siren"),
            Some(DetectState::Cooldown)
        );
    }

    #[test]
    fn invalid_swap_keeps_previous_config() {
        let mut detector = Detector::new(test_config(), 40.0).unwrap();

        let mut bad = test_config();
        bad.signatures[0].bands.clear();
        assert!(detector.swap_config(bad).is_err());

        // Previous signature set still active.
        let outcome = detector.process_frame(&spectrum(0, 400.0, 0.1), 0.0, 0);
        assert_eq!(outcome.scores.len(), 1);
    }

    #[test]
    fn swap_preserves_surviving_machine_state() {
        let mut detector = Detector::new(test_config(), 40.0).unwrap();
        detector.process_frame(&spectrum(0, 400.0, 0.1), 0.0, 0);
        assert_eq!(detector.state_of("siren"), Some(DetectState::Suspect));

        let mut cfg = test_config();
        cfg.cooldown_ms = 800;
        detector.swap_config(cfg).unwrap();
        assert_eq!(detector.state_of("siren"), Some(DetectState::Suspect));
    }

    #[test]
    fn disabling_a_signature_removes_its_machine() {
        let mut detector = Detector::new(test_config(), 40.0).unwrap();
        let mut cfg = test_config();
        cfg.signatures[0].enabled = false;
        detector.swap_config(cfg).unwrap();

        assert_eq!(detector.state_of("siren"), None);
        let outcome = detector.process_frame(&spectrum(0, 400.0, 0.1), 0.0, 0);
        assert!(outcome.scores.is_empty());
        assert!(outcome.events.is_empty());
    }
}
