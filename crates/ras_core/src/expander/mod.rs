//! Soft downward expander for residual cancellation artifacts.
//!
//! An envelope follower (instant attack, one-pole release) drives a gate
//! whose closed gain is `ratio` instead of zero. The gain opens instantly,
//! closes with an exponential release, and is smoothed with a centred
//! moving average before it is applied.

use crate::audio::AudioBuffer;
use crate::config::ExpandSettings;

/// Expander parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpanderParams {
    /// Gate threshold in dBFS.
    pub threshold_db: f64,
    /// Gain below the threshold (0..=1).
    pub ratio: f64,
    /// Gain release time in milliseconds (0 = instant).
    pub release_ms: f64,
    /// Envelope follower release in milliseconds.
    pub envelope_release_ms: f64,
    /// Moving-average length of the gain curve (<= 1 disables smoothing).
    pub smoothing_samples: usize,
}

impl Default for ExpanderParams {
    fn default() -> Self {
        Self::from(&ExpandSettings::default())
    }
}

impl From<&ExpandSettings> for ExpanderParams {
    fn from(settings: &ExpandSettings) -> Self {
        Self {
            threshold_db: settings.threshold_db,
            ratio: settings.ratio,
            release_ms: settings.release_ms,
            envelope_release_ms: settings.envelope_release_ms,
            smoothing_samples: settings.smoothing_samples,
        }
    }
}

impl ExpanderParams {
    /// Linear threshold.
    pub fn threshold_linear(&self) -> f64 {
        10f64.powf(self.threshold_db / 20.0)
    }
}

/// One-pole coefficient for a time constant of `ms` milliseconds.
fn release_coefficient(ms: f64, sample_rate: u32) -> f64 {
    let samples = ms * sample_rate as f64 / 1000.0;
    if samples <= 0.0 || !samples.is_finite() {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

/// Envelope with instant attack and one-pole release.
pub fn envelope(samples: &[f64], release_ms: f64, sample_rate: u32) -> Vec<f64> {
    let coeff = release_coefficient(release_ms, sample_rate);
    let mut env = 0.0;
    samples
        .iter()
        .map(|s| {
            let level = s.abs();
            env = if level > env {
                level
            } else {
                coeff * env + (1.0 - coeff) * level
            };
            env
        })
        .collect()
}

/// Smoothed gain curve for `samples`.
pub fn gain_curve(samples: &[f64], params: &ExpanderParams, sample_rate: u32) -> Vec<f64> {
    let env = envelope(samples, params.envelope_release_ms, sample_rate);
    let threshold = params.threshold_linear();
    let ratio = params.ratio.clamp(0.0, 1.0);
    let release = release_coefficient(params.release_ms, sample_rate);

    let mut gain = 1.0;
    let raw: Vec<f64> = env
        .iter()
        .map(|&e| {
            let target = if e > threshold { 1.0 } else { ratio };
            gain = if target >= gain {
                target
            } else {
                target + (gain - target) * release
            };
            gain
        })
        .collect();

    moving_average(&raw, params.smoothing_samples)
}

/// Centred moving average normalized by the samples actually in range.
fn moving_average(values: &[f64], width: usize) -> Vec<f64> {
    if width <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    let before = width / 2;
    let after = width - 1 - before;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(values.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Apply the expander to every channel.
///
/// The gain curve is computed once from the per-sample peak across
/// channels so all channels are gated together.
pub fn expand(buffer: &AudioBuffer, params: &ExpanderParams) -> AudioBuffer {
    let linked: Vec<f64> = (0..buffer.len())
        .map(|i| {
            buffer
                .channels()
                .iter()
                .fold(0.0_f64, |acc, ch| acc.max(ch[i].abs()))
        })
        .collect();
    let gains = gain_curve(&linked, params, buffer.sample_rate());

    tracing::debug!(
        threshold_db = params.threshold_db,
        ratio = params.ratio,
        closed = gains.iter().filter(|&&g| g < 1.0).count(),
        "Expander applied"
    );
    buffer.map_channels(|ch| ch.iter().zip(&gains).map(|(s, g)| s * g).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 8000;

    fn params() -> ExpanderParams {
        ExpanderParams {
            threshold_db: -20.0,
            ratio: 0.2,
            release_ms: 50.0,
            envelope_release_ms: 10.0,
            smoothing_samples: 100,
        }
    }

    #[test]
    fn envelope_attacks_instantly_and_decays() {
        let mut x = vec![0.0; 200];
        x[10] = 1.0;
        let env = envelope(&x, 1.0, SR);
        assert_eq!(env[10], 1.0);
        assert!(env[11] < 1.0 && env[11] > 0.0);
        assert!(env[199] < 1e-6);
    }

    #[test]
    fn quiet_signal_settles_at_ratio() {
        let x = vec![0.01; 4 * SR as usize];
        let gains = gain_curve(&x, &params(), SR);
        assert!((gains[gains.len() - 1] - 0.2).abs() < 1e-6);
        let out = expand(&AudioBuffer::mono(x, SR), &params());
        assert!((out.channel(0)[out.len() - 1] - 0.002).abs() < 1e-6);
    }

    #[test]
    fn loud_signal_is_untouched() {
        let x = vec![0.5; 2000];
        let gains = gain_curve(&x, &params(), SR);
        assert!(gains.iter().all(|g| (g - 1.0).abs() < 1e-12));
    }

    #[test]
    fn gain_opens_instantly_but_closes_slowly() {
        let p = ExpanderParams {
            smoothing_samples: 0,
            ..params()
        };
        let mut x = vec![0.5; 1000];
        x.extend(vec![0.0; 1000]);
        x.extend(vec![0.5; 10]);
        let gains = gain_curve(&x, &p, SR);
        // Shortly after the drop the gain is still mostly open
        assert!(gains[1100] > 0.5);
        assert!(gains[1999] < 0.32 && gains[1999] > 0.2);
        assert_eq!(gains[2000], 1.0);
    }

    #[test]
    fn zero_release_is_instant() {
        let p = ExpanderParams {
            release_ms: 0.0,
            envelope_release_ms: 0.0,
            smoothing_samples: 0,
            ..params()
        };
        let gains = gain_curve(&[0.5, 0.0, 0.0], &p, SR);
        assert_eq!(gains, vec![1.0, 0.2, 0.2]);
    }

    #[test]
    fn moving_average_has_no_edge_dip() {
        let ones = vec![1.0; 50];
        let smoothed = moving_average(&ones, 11);
        assert!(smoothed.iter().all(|v| (v - 1.0).abs() < 1e-12));
        assert_eq!(moving_average(&[1.0, 3.0], 1), vec![1.0, 3.0]);
    }

    #[test]
    fn channels_are_gated_together() {
        let loud = vec![0.5; 3000];
        let quiet = vec![0.001; 3000];
        let buffer = AudioBuffer::new(vec![loud, quiet.clone()], SR).unwrap();
        let out = expand(&buffer, &params());
        assert_eq!(out.channel(1), quiet.as_slice());
    }
}
