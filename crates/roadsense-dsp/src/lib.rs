pub mod spectral;
pub mod types;
pub mod window;

pub use spectral::{SpectralAnalyzer, SpectralError};
pub use types::SpectralFrame;
