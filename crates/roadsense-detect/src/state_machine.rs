use crate::types::{DetectState, DetectionEvent, Direction};

/// Temporal smoothing for one signature: `Idle → Suspect → Confirmed →
/// Cooldown → Idle`. Raw per-frame scores are too noisy to alert on; engine
/// and road noise produce single-frame spikes. Requiring K consecutive
/// confirming frames trades a little latency for a large false-positive
/// reduction, and the cooldown keeps a sustained source from flooding the
/// relay.
///
/// The machine's clock is frame time: it advances once per incoming score,
/// which arrives once per hop. Transitions are processed strictly in
/// frame-sequence order.
pub struct SignatureStateMachine {
    name: String,
    state: DetectState,
    suspect_threshold: f32,
    confirm_threshold: f32,
    /// K, the number of consecutive confirming frames needed.
    confirm_frames: u32,
    cooldown_frames: u32,
    direction_margin: f32,

    run_len: u32,
    score_sum: f32,
    balance_sum: f32,
    cooldown_remaining: u32,
}

pub struct StateMachineParams {
    pub suspect_threshold: f32,
    pub confirm_threshold: f32,
    pub confirm_frames: u32,
    pub cooldown_frames: u32,
    pub direction_margin: f32,
}

impl SignatureStateMachine {
    pub fn new(name: impl Into<String>, params: StateMachineParams) -> Self {
        Self {
            name: name.into(),
            state: DetectState::Idle,
            suspect_threshold: params.suspect_threshold,
            confirm_threshold: params.confirm_threshold,
            confirm_frames: params.confirm_frames.max(1),
            cooldown_frames: params.cooldown_frames,
            direction_margin: params.direction_margin,
            run_len: 0,
            score_sum: 0.0,
            balance_sum: 0.0,
            cooldown_remaining: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> DetectState {
        self.state
    }

    /// Advance one frame. Returns the confirmed event when this frame
    /// completes a run of K confirming frames.
    pub fn process(
        &mut self,
        score: f32,
        balance: f32,
        timestamp_ms: u64,
    ) -> Option<DetectionEvent> {
        match self.state {
            DetectState::Idle => {
                if score >= self.suspect_threshold {
                    self.state = DetectState::Suspect;
                    self.begin_or_extend_run(score, balance);
                    return self.try_confirm(timestamp_ms);
                }
                None
            }

            DetectState::Suspect => {
                if score < self.suspect_threshold {
                    // Transient noise: abandon silently, no event.
                    self.reset_run();
                    self.state = DetectState::Idle;
                    return None;
                }
                if score >= self.confirm_threshold {
                    self.begin_or_extend_run(score, balance);
                    return self.try_confirm(timestamp_ms);
                }
                // Still suspicious, but the consecutive confirming run broke.
                self.reset_run();
                None
            }

            DetectState::Confirmed => {
                // Unreachable via process(); emission moves straight to
                // Cooldown. Kept total for completeness.
                self.state = DetectState::Cooldown;
                None
            }

            DetectState::Cooldown => {
                self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
                if self.cooldown_remaining == 0 {
                    // Quiet period over. The current frame is swallowed;
                    // scoring resumes with the next one.
                    self.state = DetectState::Idle;
                }
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = DetectState::Idle;
        self.reset_run();
        self.cooldown_remaining = 0;
    }

    fn begin_or_extend_run(&mut self, score: f32, balance: f32) {
        if score >= self.confirm_threshold {
            self.run_len += 1;
            self.score_sum += score;
            self.balance_sum += balance;
        } else {
            self.reset_run();
        }
    }

    fn try_confirm(&mut self, timestamp_ms: u64) -> Option<DetectionEvent> {
        if self.run_len < self.confirm_frames {
            return None;
        }

        let confidence = self.score_sum / self.run_len as f32;
        let mean_balance = self.balance_sum / self.run_len as f32;
        let direction = if mean_balance > self.direction_margin {
            Direction::Left
        } else if mean_balance < -self.direction_margin {
            Direction::Right
        } else {
            Direction::Unknown
        };

        self.reset_run();
        if self.cooldown_frames == 0 {
            self.state = DetectState::Idle;
        } else {
            self.state = DetectState::Cooldown;
            self.cooldown_remaining = self.cooldown_frames;
        }

        tracing::debug!(
            signature = %self.name,
            confidence,
            ?direction,
            timestamp_ms,
            "detection confirmed"
        );

        Some(DetectionEvent {
            signature: self.name.clone(),
            timestamp_ms,
            confidence,
            direction,
            state: DetectState::Confirmed,
        })
    }

    fn reset_run(&mut self) {
        self.run_len = 0;
        self.score_sum = 0.0;
        self.balance_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(confirm_frames: u32, cooldown_frames: u32) -> SignatureStateMachine {
        SignatureStateMachine::new(
            "siren",
            StateMachineParams {
                suspect_threshold: 0.5,
                confirm_threshold: 0.8,
                confirm_frames,
                cooldown_frames,
                direction_margin: 0.2,
            },
        )
    }

    #[test]
    fn silent_scores_never_leave_idle() {
        let mut m = machine(5, 10);
        for t in 0..100 {
            assert_eq!(m.process(0.0, 0.0, t), None);
            assert_eq!(m.current_state(), DetectState::Idle);
        }
    }

    #[test]
    fn k_consecutive_confirms_once_then_idle() {
        let mut m = machine(5, 0);

        let mut events = Vec::new();
        for t in 0..5 {
            if let Some(e) = m.process(0.8, 0.0, t * 40) {
                events.push(e);
            }
        }
        // One frame below suspect right after the run.
        assert_eq!(m.process(0.2, 0.0, 200), None);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signature, "siren");
        assert_eq!(events[0].timestamp_ms, 160);
        assert_eq!(events[0].state, DetectState::Confirmed);
        assert_eq!(m.current_state(), DetectState::Idle);
    }

    #[test]
    fn run_broken_below_suspect_reverts_silently() {
        let mut m = machine(5, 10);
        for t in 0..4 {
            assert_eq!(m.process(0.9, 0.0, t), None);
        }
        assert_eq!(m.current_state(), DetectState::Suspect);

        // Falls below suspect before K reached: back to Idle, no event.
        assert_eq!(m.process(0.3, 0.0, 4), None);
        assert_eq!(m.current_state(), DetectState::Idle);

        // A fresh full run is needed from scratch.
        for t in 5..9 {
            assert_eq!(m.process(0.9, 0.0, t), None);
        }
        assert!(m.process(0.9, 0.0, 9).is_some());
    }

    #[test]
    fn middling_score_breaks_run_but_stays_suspect() {
        let mut m = machine(3, 10);
        m.process(0.9, 0.0, 0);
        m.process(0.9, 0.0, 1);
        // Above suspect, below confirm: run resets, state holds.
        assert_eq!(m.process(0.6, 0.0, 2), None);
        assert_eq!(m.current_state(), DetectState::Suspect);

        // Two more confirming frames are not enough; three are.
        assert_eq!(m.process(0.9, 0.0, 3), None);
        assert_eq!(m.process(0.9, 0.0, 4), None);
        assert!(m.process(0.9, 0.0, 5).is_some());
    }

    #[test]
    fn cooldown_suppresses_even_perfect_scores() {
        let mut m = machine(2, 4);
        m.process(0.9, 0.0, 0);
        let event = m.process(0.9, 0.0, 1);
        assert!(event.is_some());
        assert_eq!(m.current_state(), DetectState::Cooldown);

        for t in 2..6 {
            assert_eq!(m.process(1.0, 0.0, t), None);
        }
        assert_eq!(m.current_state(), DetectState::Idle);

        // After cooldown, detection works again.
        assert_eq!(m.process(1.0, 0.0, 6), None);
        assert!(m.process(1.0, 0.0, 7).is_some());
    }

    #[test]
    fn confidence_is_mean_of_confirming_run() {
        let mut m = machine(2, 4);
        m.process(0.8, 0.0, 0);
        let event = m.process(1.0, 0.0, 1).unwrap();
        assert!((event.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn direction_follows_mean_balance() {
        let mut left = machine(2, 4);
        left.process(0.9, 0.6, 0);
        let event = left.process(0.9, 0.6, 1).unwrap();
        assert_eq!(event.direction, Direction::Left);

        let mut right = machine(2, 4);
        right.process(0.9, -0.5, 0);
        let event = right.process(0.9, -0.5, 1).unwrap();
        assert_eq!(event.direction, Direction::Right);

        let mut center = machine(2, 4);
        center.process(0.9, 0.05, 0);
        let event = center.process(0.9, -0.05, 1).unwrap();
        assert_eq!(event.direction, Direction::Unknown);
    }
}
