//! Zero-phase Butterworth filtering.
//!
//! Filters are built as cascaded second-order sections via the biquad crate
//! (plus one first-order section for odd orders) and run forward then
//! backward, so the result has no group delay. This keeps the filtered
//! copies usable for lag estimation.

use std::f64::consts::PI;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Type};

use crate::analysis::{AnalysisError, AnalysisResult};
use crate::audio::AudioBuffer;

/// Filter shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// No filtering.
    #[default]
    None,
    /// Keep frequencies below `high_cutoff_hz`.
    LowPass,
    /// Keep frequencies above `low_cutoff_hz`.
    HighPass,
    /// High-pass at `low_cutoff_hz`, then low-pass at `high_cutoff_hz`.
    BandPass,
    /// Low-pass at `low_cutoff_hz` summed with high-pass at `high_cutoff_hz`.
    BandStop,
}

/// Configuration for one filtering pass.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Type of filter to apply.
    pub filter_type: FilterType,
    /// Sample rate of the audio.
    pub sample_rate: u32,
    /// Low cutoff frequency (Hz) for high-pass/band filters.
    pub low_cutoff_hz: f64,
    /// High cutoff frequency (Hz) for low-pass/band filters.
    pub high_cutoff_hz: f64,
    /// Butterworth order of each low/high-pass stage.
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_type: FilterType::None,
            sample_rate: 48000,
            low_cutoff_hz: 80.0,
            high_cutoff_hz: 9000.0,
            order: 4,
        }
    }
}

impl FilterConfig {
    /// Low-pass at `cutoff_hz`.
    pub fn low_pass(sample_rate: u32, cutoff_hz: f64) -> Self {
        Self {
            filter_type: FilterType::LowPass,
            sample_rate,
            low_cutoff_hz: 0.0,
            high_cutoff_hz: cutoff_hz,
            order: 4,
        }
    }

    /// High-pass at `cutoff_hz`.
    pub fn high_pass(sample_rate: u32, cutoff_hz: f64) -> Self {
        Self {
            filter_type: FilterType::HighPass,
            sample_rate,
            low_cutoff_hz: cutoff_hz,
            high_cutoff_hz: 0.0,
            order: 4,
        }
    }

    /// Band-pass between `low_hz` and `high_hz`.
    pub fn band_pass(sample_rate: u32, low_hz: f64, high_hz: f64) -> Self {
        Self {
            filter_type: FilterType::BandPass,
            sample_rate,
            low_cutoff_hz: low_hz,
            high_cutoff_hz: high_hz,
            order: 4,
        }
    }

    /// Band-stop between `low_hz` and `high_hz`.
    pub fn band_stop(sample_rate: u32, low_hz: f64, high_hz: f64) -> Self {
        Self {
            filter_type: FilterType::BandStop,
            ..Self::band_pass(sample_rate, low_hz, high_hz)
        }
    }

    /// Matching band (80 Hz - 9 kHz).
    pub fn match_bandpass(sample_rate: u32) -> Self {
        Self::band_pass(sample_rate, 80.0, 9000.0)
    }

    /// Cutoffs clamped to `[1, nyquist - 1]` with `high > low`.
    fn clamped_cutoffs(&self) -> (f64, f64) {
        let nyquist = self.sample_rate as f64 / 2.0;
        let ceiling = (nyquist - 1.0).max(1.0);
        let low = self.low_cutoff_hz.clamp(1.0, ceiling);
        let mut high = self.high_cutoff_hz.clamp(1.0, ceiling);
        if matches!(self.filter_type, FilterType::BandPass | FilterType::BandStop) && high <= low {
            high = (low + 1.0).min(ceiling);
        }
        (low, high)
    }
}

/// Filter every channel of a buffer.
pub fn band_filter(buffer: &AudioBuffer, config: &FilterConfig) -> AnalysisResult<AudioBuffer> {
    let config = FilterConfig {
        sample_rate: buffer.sample_rate(),
        ..config.clone()
    };
    buffer.try_map_channels(|ch| filter_samples(ch, &config))
}

/// Apply the configured zero-phase filter to a slice.
pub fn filter_samples(samples: &[f64], config: &FilterConfig) -> AnalysisResult<Vec<f64>> {
    if samples.is_empty() || config.filter_type == FilterType::None {
        return Ok(samples.to_vec());
    }
    if config.sample_rate < 4 {
        return Err(AnalysisError::Filter(format!(
            "sample rate {} too low to filter",
            config.sample_rate
        )));
    }

    let (low, high) = config.clamped_cutoffs();
    let order = config.order.max(1);
    let fs = config.sample_rate;

    match config.filter_type {
        FilterType::None => Ok(samples.to_vec()),
        FilterType::LowPass => {
            let sections = butterworth_sections(Pass::Low, fs, high, order)?;
            Ok(filtfilt(samples, &sections))
        }
        FilterType::HighPass => {
            let sections = butterworth_sections(Pass::High, fs, low, order)?;
            Ok(filtfilt(samples, &sections))
        }
        FilterType::BandPass => {
            let hp = butterworth_sections(Pass::High, fs, low, order)?;
            let lp = butterworth_sections(Pass::Low, fs, high, order)?;
            let high_passed = filtfilt(samples, &hp);
            Ok(filtfilt(&high_passed, &lp))
        }
        FilterType::BandStop => {
            let lp = butterworth_sections(Pass::Low, fs, low, order)?;
            let hp = butterworth_sections(Pass::High, fs, high, order)?;
            let below = filtfilt(samples, &lp);
            let above = filtfilt(samples, &hp);
            Ok(below.iter().zip(&above).map(|(a, b)| a + b).collect())
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Low,
    High,
}

/// Q of the `k`-th (1-based) pole pair of an order-`order` Butterworth filter.
fn butterworth_q(order: usize, k: usize) -> f64 {
    let angle = (2 * k + order - 1) as f64 * PI / (2 * order) as f64;
    -1.0 / (2.0 * angle.cos())
}

/// Build the second-order (and trailing first-order) sections.
fn butterworth_sections(
    pass: Pass,
    sample_rate: u32,
    cutoff_hz: f64,
    order: usize,
) -> AnalysisResult<Vec<Coefficients<f64>>> {
    // biquad's normalized frequency runs 0..1 up to Nyquist
    let normalized = 2.0 * cutoff_hz / sample_rate as f64;
    let filter_type = match pass {
        Pass::Low => Type::LowPass,
        Pass::High => Type::HighPass,
    };

    let mut sections = Vec::with_capacity(order / 2 + 1);
    for k in 1..=order / 2 {
        let coeffs =
            Coefficients::<f64>::from_normalized_params(filter_type, normalized, butterworth_q(order, k))
                .map_err(|e| {
                    AnalysisError::Filter(format!(
                        "cannot design {:?}-pass section at {:.1} Hz: {:?}",
                        pass, cutoff_hz, e
                    ))
                })?;
        sections.push(coeffs);
    }
    if order % 2 == 1 {
        sections.push(first_order_section(pass, sample_rate, cutoff_hz));
    }
    Ok(sections)
}

/// Bilinear-transform first-order section.
fn first_order_section(pass: Pass, sample_rate: u32, cutoff_hz: f64) -> Coefficients<f64> {
    let k = (PI * cutoff_hz / sample_rate as f64).tan();
    let a1 = (k - 1.0) / (k + 1.0);
    let (b0, b1) = match pass {
        Pass::Low => (k / (k + 1.0), k / (k + 1.0)),
        Pass::High => (1.0 / (k + 1.0), -1.0 / (k + 1.0)),
    };
    Coefficients {
        a1,
        a2: 0.0,
        b0,
        b1,
        b2: 0.0,
    }
}

/// Run all sections over the signal once.
fn run_cascade(samples: &mut [f64], sections: &[Coefficients<f64>]) {
    for coeffs in sections {
        // Fresh state per section and per pass
        let mut filter = DirectForm2Transposed::<f64>::new(*coeffs);
        for sample in samples.iter_mut() {
            *sample = filter.run(*sample);
        }
    }
}

/// Forward then backward pass.
fn filtfilt(samples: &[f64], sections: &[Coefficients<f64>]) -> Vec<f64> {
    let mut result = samples.to_vec();
    run_cascade(&mut result, sections);
    result.reverse();
    run_cascade(&mut result, sections);
    result.reverse();
    result
}
