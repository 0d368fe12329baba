use std::collections::VecDeque;

/// One fixed-length mono frame cut from the continuous sample stream.
/// `seq` increases strictly by one per emitted frame; a consumer observing
/// a jump knows exactly how many frames it lost.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate_hz: u32,
    pub seq: u64,
    /// Milliseconds of stream time at the first sample of the frame.
    pub timestamp_ms: u64,
    /// Inter-channel energy skew in [-1, 1] before downmix; positive means
    /// the left channel was louder. 0.0 for mono sources.
    pub balance: f32,
}

#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Window length N, in mono samples.
    pub frame_len: usize,
    /// Hop H between successive windows; H < N gives overlap.
    pub hop: usize,
    pub sample_rate_hz: u32,
    /// 1 (mono) or 2 (interleaved stereo).
    pub channels: u16,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            frame_len: 1280, // 80 ms at 16 kHz
            hop: 640,        // 50% overlap
            sample_rate_hz: 16_000,
            channels: 1,
        }
    }
}

impl FramerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_len == 0 {
            return Err("frame_len must be positive".into());
        }
        if self.hop == 0 || self.hop > self.frame_len {
            return Err(format!(
                "hop must be in 1..={} (got {})",
                self.frame_len, self.hop
            ));
        }
        if !(self.channels == 1 || self.channels == 2) {
            return Err(format!("channels must be 1 or 2 (got {})", self.channels));
        }
        if self.sample_rate_hz == 0 {
            return Err("sample_rate_hz must be positive".into());
        }
        Ok(())
    }

    pub fn hop_duration_ms(&self) -> f32 {
        (self.hop as f32 * 1000.0) / self.sample_rate_hz as f32
    }
}

/// Slices overlapping frames of length N at hop H out of pushed sample
/// blocks, downmixing stereo and recording per-frame channel balance.
pub struct FrameAssembler {
    cfg: FramerConfig,
    left: VecDeque<i16>,
    right: VecDeque<i16>,
    seq: u64,
    consumed_samples: u64,
}

impl FrameAssembler {
    pub fn new(cfg: FramerConfig) -> Self {
        let cap = cfg.frame_len * 2;
        Self {
            cfg,
            left: VecDeque::with_capacity(cap),
            right: VecDeque::with_capacity(cap),
            seq: 0,
            consumed_samples: 0,
        }
    }

    /// Append a block of samples (interleaved when stereo) and collect all
    /// frames it completes, in order.
    pub fn push(&mut self, block: &[i16]) -> Vec<AudioFrame> {
        if self.cfg.channels == 2 {
            for pair in block.chunks_exact(2) {
                self.left.push_back(pair[0]);
                self.right.push_back(pair[1]);
            }
        } else {
            self.left.extend(block.iter().copied());
        }

        let mut out = Vec::new();
        while self.left.len() >= self.cfg.frame_len {
            out.push(self.cut_frame());
        }
        out
    }

    fn cut_frame(&mut self) -> AudioFrame {
        let n = self.cfg.frame_len;
        let stereo = self.cfg.channels == 2;

        let mut samples = Vec::with_capacity(n);
        let mut left_sq = 0.0f64;
        let mut right_sq = 0.0f64;

        for i in 0..n {
            let l = self.left[i];
            if stereo {
                let r = self.right[i];
                samples.push(((l as i32 + r as i32) / 2) as i16);
                left_sq += (l as f64) * (l as f64);
                right_sq += (r as f64) * (r as f64);
            } else {
                samples.push(l);
            }
        }

        let balance = if stereo {
            let rms_l = (left_sq / n as f64).sqrt();
            let rms_r = (right_sq / n as f64).sqrt();
            let denom = rms_l + rms_r;
            if denom <= f64::EPSILON {
                0.0
            } else {
                (((rms_l - rms_r) / denom) as f32).clamp(-1.0, 1.0)
            }
        } else {
            0.0
        };

        // Advance by the hop; the overlapping tail stays buffered.
        for _ in 0..self.cfg.hop {
            self.left.pop_front();
            if stereo {
                self.right.pop_front();
            }
        }

        let timestamp_ms = self.consumed_samples * 1000 / self.cfg.sample_rate_hz as u64;
        self.consumed_samples += self.cfg.hop as u64;

        let frame = AudioFrame {
            samples,
            sample_rate_hz: self.cfg.sample_rate_hz,
            seq: self.seq,
            timestamp_ms,
            balance,
        };
        self.seq += 1;
        frame
    }
}
