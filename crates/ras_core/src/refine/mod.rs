//! Sub-sample lag refinement.
//!
//! Starting from a coarse integer lag, the refiner cuts a window from the
//! middle of the overlap, optionally corrects the integer lag locally, and
//! measures the remaining (fractional) delay with phase-slope regression
//! over short frames. The frame delays are reduced with a median.

mod phase_slope;

pub use phase_slope::{
    frame_delay, frame_delays, median, median_abs_deviation, unwrap_phase, FrameDelays,
    PhaseSlopeParams,
};

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResult, GccPhat, LagEstimate, RobustSearch};
use crate::config::RefineSettings;

/// Local integer correction applied before the phase-slope stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegerCorrection {
    /// GCC-PHAT on the two windows.
    #[default]
    GccPhat,
    /// Trimmed L1 search around the coarse lag.
    RobustL1,
    /// Trust the coarse integer lag.
    None,
}

impl std::fmt::Display for IntegerCorrection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegerCorrection::GccPhat => write!(f, "gcc_phat"),
            IntegerCorrection::RobustL1 => write!(f, "robust_l1"),
            IntegerCorrection::None => write!(f, "none"),
        }
    }
}

/// Non-fatal observations made while refining.
#[derive(Debug, Clone, PartialEq)]
pub enum RefineWarning {
    /// No frame produced a delay; the coarse integer lag was kept.
    NoUsableFrames,
    /// Some frames were skipped as degenerate.
    DegenerateFrames { skipped: usize, total: usize },
    /// Frame delays disagree by more than the configured spread.
    WideSpread { spread: f64 },
    /// The local integer correction was out of range and ignored.
    CorrectionRejected { correction: i64 },
}

/// Refined lag plus how it was reached.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub estimate: LagEstimate,
    /// Integer correction that was applied on top of the coarse lag.
    pub integer_correction: i64,
    /// Number of frames that produced a delay.
    pub frames_used: usize,
    /// Median absolute deviation of the frame delays (samples).
    pub spread: f64,
    pub warnings: Vec<RefineWarning>,
}

/// Phase-slope refiner configured once per run.
#[derive(Debug, Clone)]
pub struct FineLagRefiner {
    settings: RefineSettings,
}

impl FineLagRefiner {
    pub fn new(settings: RefineSettings) -> Self {
        Self { settings }
    }

    fn phase_params(&self) -> PhaseSlopeParams {
        PhaseSlopeParams {
            frame_len: self.settings.frame_len,
            hop: self.settings.hop,
            band_low_hz: self.settings.band_low_hz,
            band_high_hz: self.settings.band_high_hz,
            ..PhaseSlopeParams::default()
        }
    }

    /// Refine `coarse` for the given pair of mono signals.
    pub fn refine(
        &self,
        reference: &[f64],
        target: &[f64],
        coarse: &LagEstimate,
        sample_rate: u32,
    ) -> AnalysisResult<Refinement> {
        let method = format!("{}+phase_slope", coarse.method);
        let mut warnings = Vec::new();
        let lag = coarse.integer;

        let Some((start, len)) = self.window(reference.len(), target.len(), lag, sample_rate) else {
            tracing::debug!(lag, "No overlap at coarse lag; keeping coarse integer");
            warnings.push(RefineWarning::NoUsableFrames);
            return Ok(self.keep_coarse(coarse, method, warnings));
        };
        let ref_window = &reference[start..start + len];
        let target_start = start as i64 + lag;

        let mut rejected = None;
        let correction = match self.settings.integer_correction {
            IntegerCorrection::None => 0,
            IntegerCorrection::GccPhat => {
                let target_window = window_at(target, target_start, len);
                let local = GccPhat::new(usize::MAX, 64).estimate(ref_window, &target_window)?;
                let c = local.estimate.integer;
                if local.estimate.is_unreliable() {
                    0
                } else if c.abs() > self.settings.max_integer_correction {
                    rejected = Some(c);
                    0
                } else {
                    c
                }
            }
            IntegerCorrection::RobustL1 => {
                let search = RobustSearch {
                    search_range: self.settings.search_range,
                    keep_ratio: self.settings.keep_ratio,
                    compare_len: len,
                };
                search
                    .search(ref_window, target, target_start)
                    .map_or(0, |found| found.lag - target_start)
            }
        };

        let target_window = window_at(target, target_start + correction, len);
        let frames = frame_delays(ref_window, &target_window, sample_rate, &self.phase_params());
        if frames.skipped > 0 {
            warnings.push(RefineWarning::DegenerateFrames {
                skipped: frames.skipped,
                total: frames.total_frames(),
            });
        }

        let (Some(delay), Some(spread)) = (median(&frames.delays), median_abs_deviation(&frames.delays))
        else {
            tracing::debug!(
                skipped = frames.skipped,
                "No usable phase-slope frame; keeping coarse integer"
            );
            warnings.push(RefineWarning::NoUsableFrames);
            if let Some(correction) = rejected {
                warnings.push(RefineWarning::CorrectionRejected { correction });
            }
            return Ok(self.keep_coarse(coarse, method, warnings));
        };

        if spread > self.settings.max_spread_samples {
            warnings.push(RefineWarning::WideSpread { spread });
        }

        let total = lag as f64 + correction as f64 + delay;
        // Phase slope can still reach an offset the integer stage refused
        if let Some(c) = rejected {
            if (total - (lag + c) as f64).abs() >= 1.0 {
                warnings.push(RefineWarning::CorrectionRejected { correction: c });
            }
        }
        let estimate = LagEstimate::from_total(total, coarse.confidence, method);
        tracing::debug!(
            coarse = lag,
            correction,
            delay,
            spread,
            frames = frames.delays.len(),
            total,
            "Lag refined"
        );

        Ok(Refinement {
            estimate,
            integer_correction: correction,
            frames_used: frames.delays.len(),
            spread,
            warnings,
        })
    }

    fn keep_coarse(&self, coarse: &LagEstimate, method: String, warnings: Vec<RefineWarning>) -> Refinement {
        Refinement {
            estimate: LagEstimate::new(coarse.integer, 0.0, coarse.confidence, method),
            integer_correction: 0,
            frames_used: 0,
            spread: 0.0,
            warnings,
        }
    }

    /// Reference window `(start, len)` centred on the overlap at `lag`.
    fn window(
        &self,
        reference_len: usize,
        target_len: usize,
        lag: i64,
        sample_rate: u32,
    ) -> Option<(usize, usize)> {
        // Reference sample n pairs with target sample n + lag
        let lo = (-lag).max(0);
        let hi = (reference_len as i64).min(target_len as i64 - lag);
        if hi <= lo {
            return None;
        }
        let overlap = (hi - lo) as usize;
        let wanted = (self.settings.window_secs * sample_rate as f64).round().max(1.0) as usize;
        let len = wanted.min(overlap);
        let center = lo as usize + overlap / 2;
        let start = center.saturating_sub(len / 2).max(lo as usize);
        let start = start.min(hi as usize - len);
        Some((start, len))
    }
}

/// `len` samples of `samples` from `start`, zero outside its bounds.
fn window_at(samples: &[f64], start: i64, len: usize) -> Vec<f64> {
    (0..len as i64)
        .map(|i| {
            let idx = start + i;
            if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize]
            } else {
                0.0
            }
        })
        .collect()
}
