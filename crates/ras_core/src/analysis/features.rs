//! Frame-level features for the similarity search.
//!
//! Both extractors share one power spectrogram (centred STFT, periodic
//! Hann) so frame `t` of either feature describes the audio around sample
//! `t * hop`.
//!
//! - chroma: 12 pitch-class energies, L2-normalized per frame
//! - MFCC: mel filterbank, log, orthonormal DCT-II

use std::f64::consts::PI;

use crate::spectral::{stft, WindowKind};

use super::types::FeatureKind;

/// Feature matrix indexed `[frame][dimension]`.
pub type FeatureMatrix = Vec<Vec<f64>>;

/// Parameters shared by the feature extractors.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// FFT size for the STFT.
    pub n_fft: usize,
    /// Hop length between frames.
    pub hop: usize,
    /// Number of mel bands.
    pub n_mels: usize,
    /// Number of MFCC coefficients kept.
    pub n_mfcc: usize,
    /// Lowest frequency contributing to chroma (C1).
    pub chroma_min_hz: f64,
    /// Highest frequency contributing to chroma.
    pub chroma_max_hz: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop: 512,
            n_mels: 40,
            n_mfcc: 13,
            chroma_min_hz: 32.7,
            chroma_max_hz: 5000.0,
        }
    }
}

/// Extract the requested feature sequence.
pub fn extract(
    samples: &[f64],
    sample_rate: u32,
    kind: FeatureKind,
    config: &FeatureConfig,
) -> FeatureMatrix {
    match kind {
        FeatureKind::Chroma => chroma(samples, sample_rate, config),
        FeatureKind::Mfcc => mfcc(samples, sample_rate, config),
    }
}

fn power_spectrogram(samples: &[f64], config: &FeatureConfig) -> Vec<Vec<f64>> {
    stft(samples, config.n_fft, config.hop, WindowKind::Hann, true).power()
}

/// Chroma features: pitch-class energy, L2-normalized per frame.
///
/// Zero-energy frames become zero vectors.
pub fn chroma(samples: &[f64], sample_rate: u32, config: &FeatureConfig) -> FeatureMatrix {
    let power = power_spectrogram(samples, config);
    let bin_hz = sample_rate as f64 / config.n_fft as f64;

    // Pitch class of every bin inside the chroma range (C = 0)
    let classes: Vec<Option<usize>> = (0..config.n_fft / 2 + 1)
        .map(|k| {
            let freq = k as f64 * bin_hz;
            if freq < config.chroma_min_hz || freq > config.chroma_max_hz {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(12) as usize)
        })
        .collect();

    power
        .iter()
        .map(|frame| {
            let mut bins = vec![0.0; 12];
            for (p, class) in frame.iter().zip(&classes) {
                if let Some(c) = class {
                    bins[*c] += p;
                }
            }
            l2_normalize(&mut bins);
            bins
        })
        .collect()
}

/// MFCC features (`n_mfcc` coefficients per frame).
pub fn mfcc(samples: &[f64], sample_rate: u32, config: &FeatureConfig) -> FeatureMatrix {
    let power = power_spectrogram(samples, config);
    if power.is_empty() {
        return Vec::new();
    }
    let filterbank = mel_filterbank(sample_rate, config.n_fft, config.n_mels);

    power
        .iter()
        .map(|frame| {
            let log_mel: Vec<f64> = filterbank
                .iter()
                .map(|filter| {
                    let energy: f64 = frame.iter().zip(filter).map(|(p, w)| p * w).sum();
                    energy.max(1e-10).ln()
                })
                .collect();
            dct_ortho(&log_mel, config.n_mfcc)
        })
        .collect()
}

fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    } else {
        v.iter_mut().for_each(|x| *x = 0.0);
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

/// Triangular mel filterbank, `n_mels x (n_fft/2 + 1)`, with Slaney
/// area normalization.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);

    let hz_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_hz = sample_rate as f64 / n_fft as f64;

    (0..n_mels)
        .map(|m| {
            let (lo, mid, hi) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            let norm = if hi > lo { 2.0 / (hi - lo) } else { 0.0 };
            (0..n_bins)
                .map(|k| {
                    let f = k as f64 * bin_hz;
                    let weight = if f >= lo && f < mid && mid > lo {
                        (f - lo) / (mid - lo)
                    } else if f >= mid && f <= hi && hi > mid {
                        (hi - f) / (hi - mid)
                    } else {
                        0.0
                    };
                    weight * norm
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II, first `n_out` coefficients.
fn dct_ortho(x: &[f64], n_out: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return vec![0.0; n_out];
    }
    (0..n_out)
        .map(|k| {
            let sum: f64 = x
                .iter()
                .enumerate()
                .map(|(i, v)| v * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos())
                .sum();
            let scale = if k == 0 {
                (1.0 / n as f64).sqrt()
            } else {
                (2.0 / n as f64).sqrt()
            };
            sum * scale
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sr: u32, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin())
            .collect()
    }

    #[test]
    fn chroma_picks_pitch_class() {
        let sr = 22050;
        // A4 = pitch class 9
        let features = chroma(&tone(440.0, sr, 22050), sr, &FeatureConfig::default());
        let frame = &features[features.len() / 2];
        let best = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(best, 9);
        let norm: f64 = frame.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn silent_frames_are_zero_vectors() {
        let features = chroma(&vec![0.0; 4096], 22050, &FeatureConfig::default());
        assert!(!features.is_empty());
        assert!(features.iter().all(|f| f.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn frame_count_follows_hop() {
        let config = FeatureConfig::default();
        let features = mfcc(&tone(300.0, 16000, 16000), 16000, &config);
        assert_eq!(features.len(), 1 + 16000 / config.hop);
        assert!(features.iter().all(|f| f.len() == config.n_mfcc));
    }

    #[test]
    fn mel_filterbank_shape() {
        let fb = mel_filterbank(16000, 512, 20);
        assert_eq!(fb.len(), 20);
        assert!(fb.iter().all(|row| row.len() == 257));
        assert!(fb.iter().all(|row| row.iter().any(|&w| w > 0.0)));
    }

    #[test]
    fn dct_of_constant_is_dc_only() {
        let c = dct_ortho(&[2.0; 8], 4);
        assert!((c[0] - 2.0 * 8f64.sqrt()).abs() < 1e-9);
        assert!(c[1..].iter().all(|v| v.abs() < 1e-9));
    }
}
