//! Integer and fractional time shifting.
//!
//! Positive lags delay the signal (zeros in front), negative lags advance
//! it (leading samples dropped). The fractional part is applied as a
//! linear phase ramp in the frequency domain on a zero-padded copy, so the
//! wrap-around of the circular shift only ever touches padding.

use std::f64::consts::PI;

use crate::audio::AudioBuffer;
use crate::spectral::{forward_real, inverse_real, next_pow2, signed_bin, Complex};

/// Fractional lags smaller than this are treated as zero.
pub const FRACTIONAL_EPSILON: f64 = 1e-6;

/// Default zero padding on each side of the fractional shift.
pub const DEFAULT_PAD_MARGIN: usize = 2048;

/// Applies integer + fractional lags.
#[derive(Debug, Clone, Copy)]
pub struct FractionalShifter {
    /// Zeros added on both sides before the FFT.
    pub pad_margin: usize,
}

impl Default for FractionalShifter {
    fn default() -> Self {
        Self {
            pad_margin: DEFAULT_PAD_MARGIN,
        }
    }
}

impl FractionalShifter {
    pub fn new(pad_margin: usize) -> Self {
        Self { pad_margin }
    }

    /// Shift `samples` by `integer_lag + fractional_lag` samples and return
    /// exactly `target_length` samples.
    pub fn apply_lag(
        &self,
        samples: &[f64],
        integer_lag: i64,
        fractional_lag: f64,
        target_length: usize,
    ) -> Vec<f64> {
        let shifted;
        let source = if fractional_lag.abs() < FRACTIONAL_EPSILON {
            samples
        } else {
            shifted = self.fractional_shift(samples, fractional_lag);
            shifted.as_slice()
        };

        let mut out = Vec::with_capacity(target_length);
        if integer_lag >= 0 {
            let delay = (integer_lag as usize).min(target_length);
            out.resize(delay, 0.0);
            let remaining = target_length - delay;
            out.extend(source.iter().take(remaining));
        } else {
            let cut = integer_lag.unsigned_abs() as usize;
            if cut < source.len() {
                out.extend(source[cut..].iter().take(target_length));
            }
        }
        out.resize(target_length, 0.0);
        out
    }

    /// Apply the same lag to every channel of `buffer`.
    pub fn apply_lag_buffer(
        &self,
        buffer: &AudioBuffer,
        integer_lag: i64,
        fractional_lag: f64,
        target_length: usize,
    ) -> AudioBuffer {
        buffer.map_channels(|ch| self.apply_lag(ch, integer_lag, fractional_lag, target_length))
    }

    /// Delay by `delta` samples (may be negative) through a phase ramp.
    fn fractional_shift(&self, samples: &[f64], delta: f64) -> Vec<f64> {
        if samples.is_empty() {
            return Vec::new();
        }
        let pad = self.pad_margin + delta.abs().ceil() as usize;
        let padded_len = samples.len() + 2 * pad;
        let n = next_pow2(padded_len);

        let mut padded = vec![0.0; padded_len];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let mut spectrum = forward_real(&padded, n);
        for (k, bin) in spectrum.iter_mut().enumerate() {
            if n % 2 == 0 && k == n / 2 {
                // Real-valued ramp keeps the output real
                *bin *= (PI * delta).cos();
            } else {
                let phase = -2.0 * PI * signed_bin(k, n) * delta / n as f64;
                *bin *= Complex::from_polar(1.0, phase);
            }
        }

        let restored = inverse_real(spectrum);
        restored[pad..pad + samples.len()].to_vec()
    }
}

/// [`FractionalShifter::apply_lag`] with the default padding.
pub fn apply_lag(samples: &[f64], integer_lag: i64, fractional_lag: f64, target_length: usize) -> Vec<f64> {
    FractionalShifter::default().apply_lag(samples, integer_lag, fractional_lag, target_length)
}

/// [`FractionalShifter::apply_lag_buffer`] with the default padding.
pub fn apply_lag_buffer(
    buffer: &AudioBuffer,
    integer_lag: i64,
    fractional_lag: f64,
    target_length: usize,
) -> AudioBuffer {
    FractionalShifter::default().apply_lag_buffer(buffer, integer_lag, fractional_lag, target_length)
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

    #[test]
    fn identity_is_exact() {
        let x = noise(1000, 1);
        assert_eq!(apply_lag(&x, 0, 0.0, 1000), x);
        assert_eq!(apply_lag(&x, 0, 1e-9, 1000), x);
    }

    #[test]
    fn positive_integer_lag_delays() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(apply_lag(&x, 2, 0.0, 4), vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(apply_lag(&x, 2, 0.0, 7), vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn negative_integer_lag_advances() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(apply_lag(&x, -1, 0.0, 4), vec![2.0, 3.0, 4.0, 0.0]);
        assert_eq!(apply_lag(&x, -10, 0.0, 3), vec![0.0, 0.0, 0.0]);
        assert_eq!(apply_lag(&x, 10, 0.0, 3), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn integer_round_trip() {
        let x = noise(500, 2);
        let delayed = apply_lag(&x, 1, 0.0, 501);
        let back = apply_lag(&delayed, -1, 0.0, 500);
        assert_eq!(back, x);
    }

    #[test]
    fn fractional_shift_preserves_energy() {
        // Band-limited so the shifted copy keeps its energy in-frame
        let x: Vec<f64> = (0..4096)
            .map(|i| {
                let t = i as f64;
                let env = (PI * t / 4096.0).sin().powi(2);
                env * ((0.05 * t).sin() + 0.5 * (0.11 * t).cos())
            })
            .collect();
        let y = apply_lag(&x, 0, 0.37, x.len());
        let ex: f64 = x.iter().map(|v| v * v).sum();
        let ey: f64 = y.iter().map(|v| v * v).sum();
        assert!((ex - ey).abs() / ex < 1e-3);
    }

    #[test]
    fn half_sample_shifts_compose() {
        let x: Vec<f64> = (0..2048).map(|i| (0.02 * i as f64).sin()).collect();
        let once = apply_lag(&x, 0, 0.5, x.len());
        let twice = apply_lag(&once, 0, 0.5, x.len());
        let integer = apply_lag(&x, 1, 0.0, x.len());
        for i in 400..1650 {
            assert!((twice[i] - integer[i]).abs() < 1e-3, "sample {i}");
        }
    }

    #[test]
    fn fractional_matches_analytic_delay() {
        let freq = 0.013;
        let x: Vec<f64> = (0..3000).map(|i| (2.0 * PI * freq * i as f64).sin()).collect();
        let y = apply_lag(&x, 0, 0.25, x.len());
        for i in 500..2500 {
            let expected = (2.0 * PI * freq * (i as f64 - 0.25)).sin();
            assert!((y[i] - expected).abs() < 1e-3, "sample {i}");
        }
    }

    #[test]
    fn output_length_is_exact() {
        let x = noise(100, 3);
        assert_eq!(apply_lag(&x, 3, 0.4, 250).len(), 250);
        assert_eq!(apply_lag(&x, -3, -0.4, 10).len(), 10);
        assert_eq!(apply_lag(&[], 5, 0.3, 8), vec![0.0; 8]);
    }

    #[test]
    fn buffer_shift_applies_per_channel() {
        let buffer = AudioBuffer::new(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 8000).unwrap();
        let shifted = apply_lag_buffer(&buffer, 1, 0.0, 3);
        assert_eq!(shifted.channel(0), &[0.0, 1.0, 2.0]);
        assert_eq!(shifted.channel(1), &[0.0, 4.0, 5.0]);
        assert_eq!(shifted.sample_rate(), 8000);
    }
}
