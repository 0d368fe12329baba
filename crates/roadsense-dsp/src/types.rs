/// Magnitude spectrum of one audio frame. Bins span 0 to Nyquist; the
/// source frame's sequence number is carried for traceability.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    pub seq: u64,
    pub sample_rate_hz: u32,
    /// Spacing between adjacent bin centers, in Hz.
    pub bin_width_hz: f32,
    /// `fft_len / 2 + 1` magnitudes, normalized by FFT length.
    pub magnitudes: Vec<f32>,
}

impl SpectralFrame {
    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Center frequency of bin `k`.
    pub fn bin_center_hz(&self, k: usize) -> f32 {
        k as f32 * self.bin_width_hz
    }

    /// Iterate (bin-center Hz, magnitude) pairs.
    pub fn bins(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.magnitudes
            .iter()
            .enumerate()
            .map(|(k, &m)| (self.bin_center_hz(k), m))
    }

    /// Mean magnitude across bins whose centers fall in `[lo_hz, hi_hz]`.
    /// Returns 0.0 for a band that covers no bins.
    pub fn band_magnitude(&self, lo_hz: f32, hi_hz: f32) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for (hz, mag) in self.bins() {
            if hz >= lo_hz && hz <= hi_hz {
                sum += mag;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Spectral energy, accounting for the conjugate-symmetric half that the
    /// real transform folds away (all bins doubled except DC and Nyquist).
    pub fn energy(&self) -> f32 {
        let last = self.magnitudes.len().saturating_sub(1);
        self.magnitudes
            .iter()
            .enumerate()
            .map(|(k, &m)| {
                let fold = if k == 0 || k == last { 1.0 } else { 2.0 };
                fold * m * m
            })
            .sum()
    }
}
