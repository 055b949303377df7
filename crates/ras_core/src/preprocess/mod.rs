//! Signal preprocessing: normalization and zero-phase filtering.
//!
//! Everything here is a pure function over copies. Estimation stages use
//! the filtered mono copies produced by [`prepare_for_matching`]; the
//! unfiltered full-channel data is kept for output.

mod filtering;
mod normalize;

pub use filtering::{band_filter, filter_samples, FilterConfig, FilterType};
pub use normalize::{normalize, normalize_samples, NORMALIZE_EPSILON};

use crate::analysis::AnalysisResult;
use crate::audio::AudioBuffer;
use crate::config::PreprocessSettings;

/// Build the mono copy used for lag estimation.
///
/// Mono mixdown, peak normalization, then (when enabled) a rumble
/// high-pass followed by the matching band-pass.
pub fn prepare_for_matching(
    buffer: &AudioBuffer,
    settings: &PreprocessSettings,
) -> AnalysisResult<Vec<f64>> {
    let mono = buffer.mono_samples();
    let mut samples = if settings.normalize {
        normalize_samples(&mono)
    } else {
        mono
    };

    if settings.match_filter {
        let sr = buffer.sample_rate();
        let mut highpass = FilterConfig::high_pass(sr, settings.highpass_hz);
        highpass.order = settings.filter_order;
        let mut bandpass = FilterConfig::band_pass(sr, settings.band_low_hz, settings.band_high_hz);
        bandpass.order = settings.filter_order;

        samples = filter_samples(&samples, &highpass)?;
        samples = filter_samples(&samples, &bandpass)?;
    }

    tracing::debug!(
        len = samples.len(),
        filtered = settings.match_filter,
        "Prepared matching copy"
    );
    Ok(samples)
}
