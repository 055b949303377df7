//! Spectral building blocks shared by the estimator, refiner and canceller.

mod fft;
mod stft;
mod window;

pub use fft::{forward_real, inverse_real, next_pow2, signed_bin};
pub use stft::{istft, stft, SpectralFrame};
pub use window::{hann_window, WindowKind};

pub use rustfft::num_complex::Complex;
