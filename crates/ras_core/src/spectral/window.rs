//! Analysis windows.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Window applied to each STFT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Periodic Hann (the DFT-even variant used for STFT/ISTFT pairs).
    #[default]
    Hann,
    /// Symmetric Hann (both end points zero).
    HannSymmetric,
    /// No tapering.
    Rectangular,
}

impl WindowKind {
    /// Window coefficients of length `size`.
    pub fn coefficients(&self, size: usize) -> Vec<f64> {
        match self {
            WindowKind::Hann => hann_window(size),
            WindowKind::HannSymmetric => {
                if size < 2 {
                    return vec![1.0; size];
                }
                let denom = (size - 1) as f64;
                (0..size)
                    .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos()))
                    .collect()
            }
            WindowKind::Rectangular => vec![1.0; size],
        }
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_hann_shape() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
        assert!((w[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn symmetric_hann_ends_at_zero() {
        let w = WindowKind::HannSymmetric.coefficients(9);
        assert!(w[0].abs() < 1e-12);
        assert!(w[8].abs() < 1e-12);
        assert!((w[4] - 1.0).abs() < 1e-12);
    }
}
