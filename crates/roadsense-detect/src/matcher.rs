use roadsense_dsp::SpectralFrame;

use crate::signature::Signature;
use crate::types::DetectionScore;

/// Scores spectral frames against enabled signatures. Disabled signatures
/// are skipped entirely: "not evaluated" is different from "no match" and
/// callers must be able to tell them apart.
pub struct SignatureMatcher {
    signatures: Vec<Signature>,
}

impl SignatureMatcher {
    /// Only enabled signatures are retained; the rest never produce scores.
    pub fn new(signatures: impl IntoIterator<Item = Signature>) -> Self {
        Self {
            signatures: signatures.into_iter().filter(|s| s.enabled).collect(),
        }
    }

    pub fn signature_names(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(|s| s.name.as_str())
    }

    /// One DetectionScore per enabled signature for this frame.
    pub fn match_frame(&self, spectrum: &SpectralFrame) -> Vec<DetectionScore> {
        self.signatures
            .iter()
            .map(|sig| DetectionScore {
                signature: sig.name.clone(),
                seq: spectrum.seq,
                score: Self::score(sig, spectrum),
            })
            .collect()
    }

    /// Weighted fraction of the signature's bands whose observed magnitude
    /// falls inside the expected range, in [0, 1]. Scores under the
    /// signature's floor collapse to 0.0.
    pub fn score(sig: &Signature, spectrum: &SpectralFrame) -> f32 {
        let mut matched_weight = 0.0f32;
        let mut total_weight = 0.0f32;

        for band in &sig.bands {
            let magnitude = spectrum.band_magnitude(band.low_hz, band.high_hz);
            total_weight += band.weight;
            if band.contains(magnitude) {
                matched_weight += band.weight;
            }
        }

        if total_weight <= 0.0 {
            return 0.0;
        }

        let score = (matched_weight / total_weight).clamp(0.0, 1.0);
        if score < sig.min_score {
            0.0
        } else {
            score
        }
    }
}
