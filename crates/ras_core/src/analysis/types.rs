//! Core types for lag estimation.

use serde::{Deserialize, Serialize};

/// Estimated offset of the target relative to the reference.
///
/// Positive lag means the target is delayed (its content appears later
/// than in the reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagEstimate {
    /// Integer part in samples.
    pub integer: i64,
    /// Fractional part in samples, within `[-0.5, 0.5)`.
    pub fractional: f64,
    /// Confidence score (0 - 100). Zero means "no usable estimate".
    pub confidence: f64,
    /// Method that produced the estimate.
    pub method: String,
}

impl LagEstimate {
    /// Create an estimate from already split parts.
    pub fn new(integer: i64, fractional: f64, confidence: f64, method: impl Into<String>) -> Self {
        Self::from_total(integer as f64 + fractional, confidence, method)
    }

    /// Fold any real-valued lag into `integer + fractional` with
    /// `fractional` in `[-0.5, 0.5)`.
    pub fn from_total(total: f64, confidence: f64, method: impl Into<String>) -> Self {
        let integer = (total + 0.5).floor();
        let mut fractional = total - integer;
        // Rounding noise can land exactly on the excluded upper bound
        if fractional >= 0.5 {
            fractional -= 1.0;
        }
        Self {
            integer: integer as i64,
            fractional,
            confidence: confidence.clamp(0.0, 100.0),
            method: method.into(),
        }
    }

    /// Zero lag with zero confidence.
    pub fn unreliable(method: impl Into<String>) -> Self {
        Self {
            integer: 0,
            fractional: 0.0,
            confidence: 0.0,
            method: method.into(),
        }
    }

    /// Whether this estimate carries no confidence at all.
    pub fn is_unreliable(&self) -> bool {
        self.confidence <= 0.0
    }

    /// Total lag in samples.
    pub fn total(&self) -> f64 {
        self.integer as f64 + self.fractional
    }

    /// Total lag in milliseconds.
    pub fn delay_ms(&self, sample_rate: u32) -> f64 {
        self.total() / sample_rate as f64 * 1000.0
    }
}

/// Coarse search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseStrategy {
    /// GCC-PHAT when the lengths are comparable, similarity search otherwise.
    Auto,
    /// Phase-transform cross-correlation over the whole signals.
    GccPhat,
    /// Feature-sequence search of the shorter signal within the longer one.
    Similarity {
        feature: FeatureKind,
        scoring: SimilarityScoring,
    },
}

impl CoarseStrategy {
    /// Short label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            CoarseStrategy::Auto => "auto".to_string(),
            CoarseStrategy::GccPhat => "gcc_phat".to_string(),
            CoarseStrategy::Similarity { feature, scoring } => {
                format!("{}_{}", feature, scoring)
            }
        }
    }
}

impl std::fmt::Display for CoarseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Feature sequence used by the similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// 12-bin pitch-class energy.
    #[default]
    Chroma,
    /// Mel-frequency cepstral coefficients.
    Mfcc,
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureKind::Chroma => write!(f, "chroma"),
            FeatureKind::Mfcc => write!(f, "mfcc"),
        }
    }
}

/// How a candidate offset is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityScoring {
    /// Frame-normalized cosine similarity (higher is better).
    #[default]
    Cosine,
    /// Banded DTW distance on z-scored features (lower is better).
    Dtw,
}

impl std::fmt::Display for SimilarityScoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityScoring::Cosine => write!(f, "cosine"),
            SimilarityScoring::Dtw => write!(f, "dtw"),
        }
    }
}

/// A selected peak of a candidate search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Lag in samples (same sign convention as [`LagEstimate`]).
    pub lag_samples: i64,
    /// Raw score (similarity or distance).
    pub score: f64,
}

/// Details of how a coarse estimate was reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchDiagnostics {
    /// Raw score of the winning candidate.
    pub best_score: f64,
    /// Second peak after non-maximum suppression, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_up: Option<Peak>,
    /// Candidates that produced a score.
    pub candidates_scored: usize,
    /// Candidates skipped as numerically degenerate.
    pub candidates_skipped: usize,
}

/// Output of the coarse estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoarseResult {
    /// The estimate itself.
    pub estimate: LagEstimate,
    /// Search details.
    pub diagnostics: SearchDiagnostics,
}

impl CoarseResult {
    /// Result with no diagnostics.
    pub fn bare(estimate: LagEstimate) -> Self {
        Self {
            estimate,
            diagnostics: SearchDiagnostics::default(),
        }
    }
}

/// Error types for the DSP modules.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Inputs violate a precondition (empty, wrong layout, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Two buffers that must share a sample rate do not.
    #[error("Sample rate mismatch: reference {reference} Hz vs target {target} Hz")]
    SampleRateMismatch { reference: u32, target: u32 },

    /// A frame or candidate had no usable energy or variance.
    #[error("Numerically degenerate: {0}")]
    NumericalDegenerate(String),

    /// No estimate with non-zero confidence could be produced.
    #[error("No reliable estimate: {0}")]
    NoReliableEstimate(String),

    /// The candidate worker pool could not be created.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Filter design failed.
    #[error("Filter error: {0}")]
    Filter(String),
}

/// Type alias for analysis results.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_total_folds_into_half_open_range() {
        let lag = LagEstimate::from_total(12.3, 50.0, "test");
        assert_eq!(lag.integer, 12);
        assert!((lag.fractional - 0.3).abs() < 1e-9);

        let lag = LagEstimate::from_total(12.7, 50.0, "test");
        assert_eq!(lag.integer, 13);
        assert!((lag.fractional + 0.3).abs() < 1e-9);

        let lag = LagEstimate::from_total(2.5, 50.0, "test");
        assert_eq!(lag.integer, 3);
        assert_eq!(lag.fractional, -0.5);

        let lag = LagEstimate::from_total(-2.5, 50.0, "test");
        assert_eq!(lag.integer, -2);
        assert_eq!(lag.fractional, -0.5);
    }

    #[test]
    fn total_round_trips() {
        let lag = LagEstimate::new(-7, 0.25, 80.0, "test");
        assert!((lag.total() + 6.75).abs() < 1e-12);
        assert_eq!(lag.integer, -7);
    }

    #[test]
    fn unreliable_has_zero_confidence() {
        let lag = LagEstimate::unreliable("gcc_phat");
        assert!(lag.is_unreliable());
        assert_eq!(lag.total(), 0.0);
        assert!(!LagEstimate::new(0, 0.0, 1.0, "x").is_unreliable());
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(LagEstimate::from_total(0.0, 250.0, "x").confidence, 100.0);
        assert_eq!(LagEstimate::from_total(0.0, -3.0, "x").confidence, 0.0);
    }

    #[test]
    fn delay_ms_uses_sample_rate() {
        let lag = LagEstimate::new(48, 0.0, 100.0, "x");
        assert!((lag.delay_ms(48000) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn strategy_labels() {
        assert_eq!(CoarseStrategy::GccPhat.label(), "gcc_phat");
        let s = CoarseStrategy::Similarity {
            feature: FeatureKind::Mfcc,
            scoring: SimilarityScoring::Dtw,
        };
        assert_eq!(s.to_string(), "mfcc_dtw");
    }
}
