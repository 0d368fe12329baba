use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

use crate::types::SpectralFrame;
use crate::window::hann;

#[derive(Error, Debug)]
pub enum SpectralError {
    #[error("Malformed frame: expected {expected} samples, got {got}")]
    BadFrameLength { expected: usize, got: usize },
}

/// Hann-windowed forward FFT over fixed-length frames.
///
/// The plan, window, and scratch buffer are allocated once; `analyze` does
/// no allocation beyond the output frame. Deterministic for identical input
/// on one platform.
pub struct SpectralAnalyzer {
    sample_rate_hz: u32,
    frame_len: usize,
    fft_len: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    /// `frame_len` is the expected AudioFrame length N. Frames are windowed
    /// over N and zero-padded up to the next power of two for the transform.
    pub fn new(sample_rate_hz: u32, frame_len: usize) -> Self {
        let fft_len = frame_len.next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);

        Self {
            sample_rate_hz,
            frame_len,
            fft_len,
            fft,
            window: hann(frame_len),
            buffer: vec![Complex::default(); fft_len],
        }
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    /// Number of output bins: `fft_len / 2 + 1` (real-input symmetry).
    pub fn bin_count(&self) -> usize {
        self.fft_len / 2 + 1
    }

    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate_hz as f32 / self.fft_len as f32
    }

    /// Transform one frame of i16 samples into its magnitude spectrum.
    /// A frame of the wrong length is rejected; the caller skips it.
    pub fn analyze(&mut self, samples: &[i16], seq: u64) -> Result<SpectralFrame, SpectralError> {
        if samples.len() != self.frame_len {
            return Err(SpectralError::BadFrameLength {
                expected: self.frame_len,
                got: samples.len(),
            });
        }

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < self.frame_len {
                (samples[i] as f32 / 32768.0) * self.window[i]
            } else {
                0.0
            };
            *slot = Complex::new(sample, 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_len as f32;
        let magnitudes: Vec<f32> = self.buffer[..self.bin_count()]
            .iter()
            .map(|c| c.norm() * scale)
            .collect();

        Ok(SpectralFrame {
            seq,
            sample_rate_hz: self.sample_rate_hz,
            bin_width_hz: self.bin_width_hz(),
            magnitudes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::power_gain;
    use approx::assert_relative_eq;

    fn sine_frame(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * std::f32::consts::PI * freq * t).sin() * amplitude * 32767.0) as i16
            })
            .collect()
    }

    #[test]
    fn bin_count_is_half_plus_one() {
        let mut analyzer = SpectralAnalyzer::new(16_000, 1280);
        assert_eq!(analyzer.fft_len(), 2048);

        let frame = sine_frame(400.0, 16_000, 1280, 0.5);
        let spectrum = analyzer.analyze(&frame, 0).unwrap();
        assert_eq!(spectrum.bin_count(), 2048 / 2 + 1);
    }

    #[test]
    fn peak_lands_on_tone_frequency() {
        let mut analyzer = SpectralAnalyzer::new(16_000, 1024);
        let frame = sine_frame(1000.0, 16_000, 1024, 0.5);
        let spectrum = analyzer.analyze(&frame, 3).unwrap();
        assert_eq!(spectrum.seq, 3);

        let (peak_hz, _) = spectrum
            .bins()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert!((900.0..1100.0).contains(&peak_hz), "peak at {}", peak_hz);
    }

    #[test]
    fn spectral_energy_bounded_by_input_energy() {
        let mut analyzer = SpectralAnalyzer::new(16_000, 1024);
        let frame = sine_frame(700.0, 16_000, 1024, 0.8);
        let spectrum = analyzer.analyze(&frame, 0).unwrap();

        let input_power = frame
            .iter()
            .map(|&s| {
                let x = s as f32 / 32768.0;
                x * x
            })
            .sum::<f32>()
            / frame.len() as f32;

        // Parseval: windowed spectral energy is input power scaled by the
        // window's power gain. It must never exceed the raw input power.
        let energy = spectrum.energy();
        assert!(energy <= input_power * 1.001, "{} > {}", energy, input_power);
        assert_relative_eq!(
            energy / input_power,
            power_gain(&hann(1024)),
            epsilon = 0.05
        );
    }

    #[test]
    fn identical_input_identical_output() {
        let mut analyzer = SpectralAnalyzer::new(16_000, 1280);
        let frame = sine_frame(440.0, 16_000, 1280, 0.4);
        let a = analyzer.analyze(&frame, 0).unwrap();
        let b = analyzer.analyze(&frame, 1).unwrap();
        for (x, y) in a.magnitudes.iter().zip(b.magnitudes.iter()) {
            assert_relative_eq!(x, y, max_relative = 1e-6);
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut analyzer = SpectralAnalyzer::new(16_000, 1024);
        let short = vec![0i16; 512];
        match analyzer.analyze(&short, 0) {
            Err(SpectralError::BadFrameLength { expected, got }) => {
                assert_eq!(expected, 1024);
                assert_eq!(got, 512);
            }
            other => panic!("expected BadFrameLength, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn silence_yields_zero_spectrum() {
        let mut analyzer = SpectralAnalyzer::new(16_000, 1024);
        let spectrum = analyzer.analyze(&vec![0i16; 1024], 0).unwrap();
        assert!(spectrum.magnitudes.iter().all(|&m| m == 0.0));
        assert_eq!(spectrum.band_magnitude(380.0, 420.0), 0.0);
    }
}
