//! GCC-PHAT (Generalized Cross-Correlation with Phase Transform).
//!
//! Normalizes the cross-spectrum by its magnitude, keeping only phase
//! information. This makes the peak robust to:
//! - Different recording levels
//! - Reverberation
//! - Coloured noise and some spectral differences

use crate::spectral::{forward_real, inverse_real, next_pow2, Complex};

use super::peak_fit::{argmax, fit_peak};
use super::types::{AnalysisResult, CoarseResult, LagEstimate, Peak, SearchDiagnostics};

/// Method label reported in estimates.
pub const METHOD: &str = "gcc_phat";

/// Magnitudes at or below this are left at zero by the phase transform.
const PHAT_FLOOR: f64 = 1e-12;

/// GCC-PHAT correlator.
#[derive(Debug, Clone)]
pub struct GccPhat {
    /// Inputs longer than this are truncated (comparable-length cap).
    pub max_window_samples: usize,
    /// Inputs shorter than this give an unreliable estimate.
    pub min_window_samples: usize,
}

impl Default for GccPhat {
    fn default() -> Self {
        Self {
            max_window_samples: usize::MAX,
            min_window_samples: 64,
        }
    }
}

impl GccPhat {
    /// Create a correlator with the given window limits.
    pub fn new(max_window_samples: usize, min_window_samples: usize) -> Self {
        Self {
            max_window_samples: max_window_samples.max(1),
            min_window_samples,
        }
    }

    /// Estimate the lag of `target` relative to `reference`.
    ///
    /// Positive lag means the target is delayed.
    pub fn estimate(&self, reference: &[f64], target: &[f64]) -> AnalysisResult<CoarseResult> {
        if reference.len() < self.min_window_samples.max(1)
            || target.len() < self.min_window_samples.max(1)
        {
            tracing::debug!(
                ref_len = reference.len(),
                tgt_len = target.len(),
                min = self.min_window_samples,
                "GCC-PHAT input shorter than minimum window"
            );
            return Ok(CoarseResult::bare(LagEstimate::unreliable(METHOD)));
        }

        let reference = &reference[..reference.len().min(self.max_window_samples)];
        let target = &target[..target.len().min(self.max_window_samples)];

        let correlation = gcc_phat_correlation(reference, target);
        let Some(peak_idx) = argmax(&correlation) else {
            return Ok(CoarseResult::bare(LagEstimate::unreliable(METHOD)));
        };

        let center = correlation.len() / 2;
        let refined = fit_peak(&correlation, peak_idx);
        // Correlation peaks at minus the target delay
        let lag = -(refined - center as f64);

        let abs_corr: Vec<f64> = correlation.iter().map(|x| x.abs()).collect();
        let confidence = normalize_peak_confidence(&abs_corr, peak_idx);
        let runner_up = second_peak(&abs_corr, peak_idx).map(|(idx, score)| Peak {
            lag_samples: center as i64 - idx as i64,
            score,
        });

        tracing::debug!(
            lag = lag,
            confidence = confidence,
            fft_len = correlation.len(),
            "GCC-PHAT estimate"
        );

        Ok(CoarseResult {
            estimate: LagEstimate::from_total(lag, confidence, METHOD),
            diagnostics: SearchDiagnostics {
                best_score: correlation[peak_idx],
                runner_up,
                candidates_scored: correlation.len(),
                candidates_skipped: 0,
            },
        })
    }
}

/// Phase-transform cross-correlation, re-centred so index `len / 2` is zero lag.
///
/// With the cross-power spectrum `R * conj(T)` a target delayed by `d`
/// samples peaks at index `len / 2 - d`.
pub fn gcc_phat_correlation(reference: &[f64], target: &[f64]) -> Vec<f64> {
    let n = (reference.len() + target.len()).saturating_sub(1).max(1);
    let fft_len = next_pow2(n);

    let ref_fft = forward_real(reference, fft_len);
    let tgt_fft = forward_real(target, fft_len);

    // Cross-power spectrum with PHAT weighting
    let cross: Vec<Complex<f64>> = ref_fft
        .iter()
        .zip(&tgt_fft)
        .map(|(r, t)| {
            let g = r * t.conj();
            let mag = g.norm();
            if mag > PHAT_FLOOR {
                g / mag
            } else {
                Complex::new(0.0, 0.0)
            }
        })
        .collect();

    let correlation = inverse_real(cross);

    // Zero lag at index 0 and negative lags wrapped; rotate to the centre
    let half = fft_len / 2;
    let mut centered = vec![0.0; fft_len];
    for (i, value) in correlation.into_iter().enumerate() {
        centered[(i + half) % fft_len] = value;
    }
    centered
}

/// Normalized peak confidence (0 - 100) from three metrics.
///
/// - prominence of the peak over the median level
/// - uniqueness versus the best value outside a 1% guard around the peak
/// - SNR versus the standard deviation of the lower 90% of values
///
/// Weighted 5 / 8 / 1.5, divided by 3 and clamped.
pub fn normalize_peak_confidence(abs_corr: &[f64], peak_idx: usize) -> f64 {
    if abs_corr.is_empty() || peak_idx >= abs_corr.len() {
        return 0.0;
    }
    let peak_value = abs_corr[peak_idx];

    let mut sorted = abs_corr.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[sorted.len() / 2];
    let prominence_ratio = peak_value / (median + 1e-9);

    let second_best = second_peak(abs_corr, peak_idx)
        .map(|(_, v)| v)
        .unwrap_or(median);
    let uniqueness_ratio = peak_value / (second_best + 1e-9);

    let threshold_90 = sorted
        .get(sorted.len() * 90 / 100)
        .copied()
        .unwrap_or(peak_value);
    let background: Vec<f64> = abs_corr
        .iter()
        .copied()
        .filter(|&x| x < threshold_90)
        .collect();
    let bg_stddev = if background.len() > 10 {
        let mean = background.iter().sum::<f64>() / background.len() as f64;
        let variance =
            background.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / background.len() as f64;
        variance.sqrt()
    } else {
        1e-9
    };
    let snr_ratio = peak_value / (bg_stddev + 1e-9);

    let confidence = (prominence_ratio * 5.0 + uniqueness_ratio * 8.0 + snr_ratio * 1.5) / 3.0;
    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Best value outside a guard of 1% of the array around `peak_idx`.
fn second_peak(abs_corr: &[f64], peak_idx: usize) -> Option<(usize, f64)> {
    let guard = (abs_corr.len() / 100).max(1);
    let start = peak_idx.saturating_sub(guard);
    let end = (peak_idx + guard + 1).min(abs_corr.len());
    abs_corr
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < start || *i >= end)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, &v)| (i, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn delayed(signal: &[f64], delay: usize, gain: f64) -> Vec<f64> {
        let mut out = vec![0.0; delay];
        out.extend(signal.iter().map(|s| s * gain));
        out
    }

    #[test]
    fn finds_positive_delay() {
        let reference = noise(8000, 1);
        let target = delayed(&reference, 250, 0.5);
        let result = GccPhat::default().estimate(&reference, &target).unwrap();
        assert_eq!(result.estimate.integer, 250);
        assert!(result.estimate.fractional.abs() < 0.05);
        assert!(result.estimate.confidence > 50.0);
    }

    #[test]
    fn swapping_inputs_negates_lag() {
        let reference = noise(6000, 2);
        let target = delayed(&reference, 123, 0.8);
        let gcc = GccPhat::default();
        let forward = gcc.estimate(&reference, &target).unwrap().estimate;
        let backward = gcc.estimate(&target, &reference).unwrap().estimate;
        assert_eq!(forward.integer, 123);
        assert!((forward.total() + backward.total()).abs() < 0.1);
    }

    #[test]
    fn identical_inputs_give_zero_lag() {
        let x = noise(4096, 3);
        let result = GccPhat::default().estimate(&x, &x).unwrap();
        assert_eq!(result.estimate.integer, 0);
        assert!(result.estimate.fractional.abs() < 1e-6);
    }

    #[test]
    fn short_input_is_unreliable() {
        let gcc = GccPhat::new(usize::MAX, 1024);
        let result = gcc.estimate(&noise(100, 4), &noise(5000, 5)).unwrap();
        assert!(result.estimate.is_unreliable());
        assert_eq!(result.estimate.total(), 0.0);
    }

    #[test]
    fn correlation_is_centred() {
        let x = vec![0.0, 1.0, 0.0, 0.0];
        let corr = gcc_phat_correlation(&x, &x);
        assert_eq!(argmax(&corr), Some(corr.len() / 2));
    }

    #[test]
    fn confidence_is_bounded() {
        let mut flat = vec![0.1; 1000];
        flat[500] = 1.0;
        let c = normalize_peak_confidence(&flat, 500);
        assert!((0.0..=100.0).contains(&c));
        assert_eq!(normalize_peak_confidence(&[], 0), 0.0);
    }
}
