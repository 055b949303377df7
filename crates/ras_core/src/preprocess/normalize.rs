//! Peak normalization.

use crate::audio::AudioBuffer;

/// Peaks below this are treated as silence and left untouched.
pub const NORMALIZE_EPSILON: f64 = 1e-5;

/// Scale a buffer so its peak absolute sample (over all channels) is 1.
pub fn normalize(buffer: &AudioBuffer) -> AudioBuffer {
    let peak = buffer.peak();
    if peak < NORMALIZE_EPSILON {
        return buffer.clone();
    }
    let scale = 1.0 / peak;
    buffer.map_channels(|ch| ch.iter().map(|s| s * scale).collect())
}

/// Slice version of [`normalize`].
pub fn normalize_samples(samples: &[f64]) -> Vec<f64> {
    let peak = samples.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
    if peak < NORMALIZE_EPSILON {
        return samples.to_vec();
    }
    samples.iter().map(|s| s / peak).collect()
}
