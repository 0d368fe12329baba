/// Periodic Hann window coefficients of length `len`.
pub fn hann(len: usize) -> Vec<f32> {
    if len == 0 {
        return Vec::new();
    }
    (0..len)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Mean squared coefficient of the window; the correction factor relating
/// windowed spectral energy back to input power.
pub fn power_gain(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|&w| w * w).sum::<f32>() / window.len() as f32
}
