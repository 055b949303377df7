//! Lag estimation between a reference and a target recording.
//!
//! This module contains the coarse search and the numeric building blocks
//! it shares with the refiner:
//!
//! - `gcc_phat`: phase-transform cross-correlation for comparable lengths
//! - `features` + `similarity` + `dtw`: feature-sequence search of the
//!   shorter signal inside the longer one
//! - `pool`: per-invocation worker pool for candidate scoring
//! - `robust`: trimmed L1 integer search that tolerates foreground voice
//! - `peak_fit`: sub-sample parabolic peak interpolation

pub mod dtw;
pub mod estimator;
pub mod features;
pub mod gcc_phat;
pub mod peak_fit;
pub mod pool;
pub mod robust;
pub mod similarity;
mod types;

pub use estimator::{CoarseLagEstimator, StrategyKind};
pub use features::{FeatureConfig, FeatureMatrix};
pub use gcc_phat::{gcc_phat_correlation, normalize_peak_confidence, GccPhat};
pub use peak_fit::{argmax, fit_peak, parabolic_offset};
pub use pool::CandidatePool;
pub use robust::{RobustLag, RobustSearch};
pub use types::{
    AnalysisError, AnalysisResult, CoarseResult, CoarseStrategy, FeatureKind, LagEstimate, Peak,
    SearchDiagnostics, SimilarityScoring,
};
