//! Reference bleed-through cancellation.
//!
//! Soft spectral subtraction in the STFT domain. For every channel and
//! time-frequency cell the target power is reduced by `alpha` times the
//! aligned reference power, floored at `beta` times the target power, and
//! the resulting Wiener-style gain is applied to the complex target
//! spectrum. Phase is kept, so the output resynthesises cleanly.

use crate::analysis::{AnalysisError, AnalysisResult};
use crate::audio::AudioBuffer;
use crate::config::CancelSettings;
use crate::spectral::{istft, stft, SpectralFrame, WindowKind};

/// Added to the target power so silent cells give a finite gain.
const POWER_EPSILON: f64 = 1e-12;

/// Spectral subtraction parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundCanceller {
    /// Power-domain gain of the reference estimate (amplitude gain squared).
    pub alpha: f64,
    /// Spectral floor as a share of the target power.
    pub beta: f64,
    pub n_fft: usize,
    pub hop: usize,
}

impl Default for BackgroundCanceller {
    fn default() -> Self {
        Self::from(&CancelSettings::default())
    }
}

impl From<&CancelSettings> for BackgroundCanceller {
    fn from(settings: &CancelSettings) -> Self {
        Self {
            alpha: settings.alpha,
            beta: settings.beta,
            n_fft: settings.n_fft,
            hop: settings.hop,
        }
    }
}

impl BackgroundCanceller {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            ..Self::default()
        }
    }

    fn validate(&self) -> AnalysisResult<()> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "alpha must be >= 0, got {}",
                self.alpha
            )));
        }
        if !self.beta.is_finite() || !(0.0..=1.0).contains(&self.beta) {
            return Err(AnalysisError::InvalidInput(format!(
                "beta must be within [0, 1], got {}",
                self.beta
            )));
        }
        if self.n_fft < 2 || self.hop == 0 || self.hop > self.n_fft {
            return Err(AnalysisError::InvalidInput(format!(
                "invalid STFT geometry n_fft={} hop={}",
                self.n_fft, self.hop
            )));
        }
        Ok(())
    }

    /// Remove `reference_aligned` from `target`.
    ///
    /// The reference is first resolved to the target's channel layout and
    /// length. The output has the target's layout and length.
    pub fn cancel(
        &self,
        reference_aligned: &AudioBuffer,
        target: &AudioBuffer,
    ) -> AnalysisResult<AudioBuffer> {
        if reference_aligned.sample_rate() != target.sample_rate() {
            return Err(AnalysisError::InvalidInput(format!(
                "sample rate mismatch: reference {} Hz vs target {} Hz",
                reference_aligned.sample_rate(),
                target.sample_rate()
            )));
        }
        self.validate()?;

        let reference = reference_aligned
            .with_channel_count(target.channel_count())
            .with_len(target.len());

        let channels = target
            .channels()
            .iter()
            .zip(reference.channels())
            .map(|(t, r)| self.cancel_channel(r, t))
            .collect();

        tracing::debug!(
            alpha = self.alpha,
            beta = self.beta,
            channels = target.channel_count(),
            "Background cancelled"
        );
        AudioBuffer::new(channels, target.sample_rate())
            .map_err(|e| AnalysisError::InvalidInput(e.to_string()))
    }

    /// Single-channel cancellation; output has `target.len()` samples.
    pub fn cancel_channel(&self, reference: &[f64], target: &[f64]) -> Vec<f64> {
        if target.is_empty() {
            return Vec::new();
        }
        let target_spec = stft(target, self.n_fft, self.hop, WindowKind::Hann, true);
        let reference_spec = stft(reference, self.n_fft, self.hop, WindowKind::Hann, true);

        let frames = target_spec
            .frames
            .iter()
            .enumerate()
            .map(|(t, frame)| {
                frame
                    .iter()
                    .enumerate()
                    .map(|(k, &x)| {
                        let p_ref = reference_spec
                            .frames
                            .get(t)
                            .and_then(|f| f.get(k))
                            .map_or(0.0, |r| r.norm_sqr());
                        x * self.gain(x.norm_sqr(), p_ref)
                    })
                    .collect()
            })
            .collect();

        let masked = SpectralFrame {
            frames,
            ..target_spec
        };
        let mut out = istft(&masked);
        out.resize(target.len(), 0.0);
        out
    }

    /// Amplitude gain for one cell.
    pub fn gain(&self, target_power: f64, reference_power: f64) -> f64 {
        let p_t = target_power + POWER_EPSILON;
        let p = (p_t - self.alpha * reference_power).max(self.beta * p_t);
        (p / p_t).sqrt().clamp(0.0, 1.0)
    }
}

/// [`BackgroundCanceller::cancel`] with default STFT geometry.
pub fn cancel(
    reference_aligned: &AudioBuffer,
    target: &AudioBuffer,
    alpha: f64,
    beta: f64,
) -> AnalysisResult<AudioBuffer> {
    BackgroundCanceller::new(alpha, beta).cancel(reference_aligned, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{filter_samples, FilterConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const SR: u32 = 16000;

    fn tones(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / SR as f64;
                (2.0 * PI * 440.0 * t).sin()
                    + 0.7 * (2.0 * PI * 660.0 * t).sin()
                    + 0.5 * (2.0 * PI * 990.0 * t).sin()
            })
            .map(|s| s / 2.2)
            .collect()
    }

    fn band_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let white: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect();
        filter_samples(&white, &FilterConfig::band_pass(SR, 3000.0, 7000.0)).unwrap()
    }

    fn energy(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn gain_is_bounded() {
        let canceller = BackgroundCanceller::new(0.5, 0.2);
        assert!((canceller.gain(1.0, 0.0) - 1.0).abs() < 1e-9);
        assert!((canceller.gain(1.0, 100.0) - 0.2f64.sqrt()).abs() < 1e-9);
        assert!(canceller.gain(0.0, 0.0) <= 1.0);
        let g = canceller.gain(1.0, 1.0);
        assert!((g - 0.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn alpha_zero_is_identity() {
        let x = band_noise(20000, 1);
        let target = AudioBuffer::mono(x.clone(), SR);
        let reference = AudioBuffer::mono(tones(20000), SR);
        let out = cancel(&reference, &target, 0.0, 0.2).unwrap();
        for (a, b) in out.channel(0).iter().zip(&x) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn removes_matched_reference() {
        let n = 3 * SR as usize;
        let reference = tones(n);
        let noise = band_noise(n, 2);
        let mixed: Vec<f64> = reference.iter().zip(&noise).map(|(r, v)| 0.3 * r + v).collect();

        let out = cancel(
            &AudioBuffer::mono(reference.clone(), SR),
            &AudioBuffer::mono(mixed, SR),
            0.09,
            0.01,
        )
        .unwrap();

        let before: f64 = energy(&reference.iter().map(|r| 0.3 * r).collect::<Vec<_>>());
        let residual: Vec<f64> = out.channel(0).iter().zip(&noise).map(|(o, v)| o - v).collect();
        let reduction_db = 10.0 * (before / energy(&residual)).log10();
        assert!(reduction_db >= 10.0, "reduction {reduction_db:.1} dB");
    }

    #[test]
    fn reference_is_resolved_to_target_layout() {
        let target = AudioBuffer::new(vec![band_noise(9000, 3), band_noise(9000, 4)], SR).unwrap();
        let reference = AudioBuffer::mono(tones(5000), SR);
        let out = cancel(&reference, &target, 0.5, 0.2).unwrap();
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.len(), 9000);
    }

    #[test]
    fn sample_rate_mismatch_is_invalid_input() {
        let a = AudioBuffer::mono(vec![0.0; 100], 16000);
        let b = AudioBuffer::mono(vec![0.0; 100], 48000);
        assert!(matches!(
            cancel(&a, &b, 0.5, 0.2),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_bad_parameters() {
        let a = AudioBuffer::mono(vec![0.0; 100], SR);
        assert!(cancel(&a, &a, -1.0, 0.2).is_err());
        assert!(cancel(&a, &a, 0.5, 1.5).is_err());
    }
}
