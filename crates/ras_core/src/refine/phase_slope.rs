//! Phase-slope delay estimation.
//!
//! For a target delayed by `d` samples, the cross spectrum `T * conj(R)`
//! has phase `-omega * d` plus a constant. Fitting a line with intercept
//! through the unwrapped phase against angular frequency (rad/sample) gives
//! `-d` as its slope; the constant absorbs polarity and the `2*pi` offset
//! of the first in-band bin.

use std::f64::consts::PI;

use crate::analysis::{AnalysisError, AnalysisResult};
use crate::spectral::{forward_real, WindowKind};

/// Framing and band limits of the regression.
#[derive(Debug, Clone)]
pub struct PhaseSlopeParams {
    pub frame_len: usize,
    pub hop: usize,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    /// Bins below this share of the frame's peak cross magnitude are ignored.
    pub magnitude_floor: f64,
    /// Frames with fewer usable bins are degenerate.
    pub min_bins: usize,
}

impl Default for PhaseSlopeParams {
    fn default() -> Self {
        Self {
            frame_len: 4096,
            hop: 2048,
            band_low_hz: 200.0,
            band_high_hz: 4000.0,
            magnitude_floor: 1e-9,
            min_bins: 3,
        }
    }
}

/// Per-frame delays of one window pair.
#[derive(Debug, Clone, Default)]
pub struct FrameDelays {
    /// Delay of every usable frame (samples, positive = target delayed).
    pub delays: Vec<f64>,
    /// Frames skipped as degenerate.
    pub skipped: usize,
}

impl FrameDelays {
    pub fn total_frames(&self) -> usize {
        self.delays.len() + self.skipped
    }
}

/// Delay of `target` relative to `reference` for every frame.
///
/// Both slices are read from the same start; frames run while both have
/// `frame_len` samples left.
pub fn frame_delays(
    reference: &[f64],
    target: &[f64],
    sample_rate: u32,
    params: &PhaseSlopeParams,
) -> FrameDelays {
    let len = reference.len().min(target.len());
    let mut result = FrameDelays::default();
    if params.frame_len == 0 || len < params.frame_len {
        return result;
    }

    let window = WindowKind::Hann.coefficients(params.frame_len);
    let hop = params.hop.max(1);
    let mut start = 0;
    while start + params.frame_len <= len {
        let r: Vec<f64> = reference[start..start + params.frame_len]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();
        let t: Vec<f64> = target[start..start + params.frame_len]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();

        match frame_delay(&r, &t, sample_rate, params) {
            Ok(delay) => result.delays.push(delay),
            Err(e) => {
                tracing::trace!(start, error = %e, "Phase-slope frame skipped");
                result.skipped += 1;
            }
        }
        start += hop;
    }
    result
}

/// Delay from one pair of windowed frames of equal length.
pub fn frame_delay(
    reference: &[f64],
    target: &[f64],
    sample_rate: u32,
    params: &PhaseSlopeParams,
) -> AnalysisResult<f64> {
    let n = reference.len();
    if n < 2 || target.len() != n {
        return Err(AnalysisError::InvalidInput(
            "phase-slope frames must be non-trivial and of equal length".to_string(),
        ));
    }

    let r_spec = forward_real(reference, n);
    let t_spec = forward_real(target, n);
    let bin_hz = sample_rate as f64 / n as f64;

    let cross: Vec<_> = (1..=n / 2).map(|k| (k, t_spec[k] * r_spec[k].conj())).collect();
    let peak = cross.iter().map(|(_, c)| c.norm()).fold(0.0_f64, f64::max);
    if !peak.is_finite() || peak <= 0.0 {
        return Err(AnalysisError::NumericalDegenerate("frame has no energy".to_string()));
    }
    let floor = peak * params.magnitude_floor;

    let (omegas, phases): (Vec<f64>, Vec<f64>) = cross
        .iter()
        .filter(|(k, c)| {
            let f = *k as f64 * bin_hz;
            f >= params.band_low_hz && f <= params.band_high_hz && c.norm() > floor
        })
        .map(|(k, c)| (2.0 * PI * *k as f64 / n as f64, c.arg()))
        .unzip();

    if omegas.len() < params.min_bins.max(1) {
        return Err(AnalysisError::NumericalDegenerate(format!(
            "only {} usable bins in band",
            omegas.len()
        )));
    }

    let phases = unwrap_phase(&phases);
    let count = omegas.len() as f64;
    let mean_w = omegas.iter().sum::<f64>() / count;
    let mean_p = phases.iter().sum::<f64>() / count;
    let (num, den) = omegas
        .iter()
        .zip(&phases)
        .fold((0.0, 0.0), |(num, den), (w, p)| {
            let dw = w - mean_w;
            (num + dw * (p - mean_p), den + dw * dw)
        });
    if den <= f64::EPSILON {
        return Err(AnalysisError::NumericalDegenerate(
            "in-band bins span no frequency range".to_string(),
        ));
    }
    Ok(-num / den)
}

/// Remove `2*pi` jumps between consecutive phases.
pub fn unwrap_phase(phases: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phases.len());
    let mut correction = 0.0;
    for (i, &p) in phases.iter().enumerate() {
        if i > 0 {
            let diff = p - phases[i - 1];
            if diff > PI {
                correction -= 2.0 * PI * ((diff + PI) / (2.0 * PI)).floor();
            } else if diff < -PI {
                correction += 2.0 * PI * ((-diff + PI) / (2.0 * PI)).floor();
            }
        }
        out.push(p + correction);
    }
    out
}

/// Median (mean of the middle pair for even counts).
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Median absolute deviation around the median.
pub fn median_abs_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shift::apply_lag;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn unwrap_removes_jumps() {
        let wrapped = vec![3.0, -3.0, -2.9];
        let unwrapped = unwrap_phase(&wrapped);
        assert!((unwrapped[1] - (2.0 * PI - 3.0)).abs() < 1e-12);
        assert!((unwrapped[2] - unwrapped[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn median_and_mad() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median_abs_deviation(&[1.0, 1.0, 1.0, 5.0]), Some(0.0));
    }

    #[test]
    fn recovers_fractional_delay() {
        let sr = 16000;
        let reference = noise(20000, 4);
        let target = apply_lag(&reference, 0, 0.3, reference.len());
        let frames = frame_delays(&reference, &target, sr, &PhaseSlopeParams::default());
        assert!(frames.delays.len() >= 5);
        assert_eq!(frames.skipped, 0);
        let d = median(&frames.delays).unwrap();
        assert!((d - 0.3).abs() < 0.02, "delay {d}");
    }

    #[test]
    fn inverted_polarity_keeps_the_delay() {
        let sr = 16000;
        let reference = noise(20000, 6);
        let target: Vec<f64> = apply_lag(&reference, 0, 0.3, reference.len())
            .into_iter()
            .map(|s| -s)
            .collect();
        let frames = frame_delays(&reference, &target, sr, &PhaseSlopeParams::default());
        let d = median(&frames.delays).unwrap();
        assert!((d - 0.3).abs() < 0.02, "delay {d}");
    }

    #[test]
    fn negative_delay_has_negative_sign() {
        let sr = 16000;
        let reference = noise(12000, 5);
        let target = apply_lag(&reference, 0, -0.45, reference.len());
        let frames = frame_delays(&reference, &target, sr, &PhaseSlopeParams::default());
        let d = median(&frames.delays).unwrap();
        assert!((d + 0.45).abs() < 0.02, "delay {d}");
    }

    #[test]
    fn silent_frames_are_skipped() {
        let silence = vec![0.0; 10000];
        let frames = frame_delays(&silence, &silence, 16000, &PhaseSlopeParams::default());
        assert!(frames.delays.is_empty());
        assert!(frames.skipped > 0);
        assert_eq!(frames.total_frames(), frames.skipped);
    }

    #[test]
    fn too_short_gives_no_frames() {
        let x = noise(1000, 6);
        let frames = frame_delays(&x, &x, 16000, &PhaseSlopeParams::default());
        assert_eq!(frames.total_frames(), 0);
    }
}
