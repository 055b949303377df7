//! Coarse lag estimation.
//!
//! Dispatches to GCC-PHAT or to the feature similarity search, resolves
//! `auto`, and turns a winning frame offset into a signed sample lag.

use serde::{Deserialize, Serialize};

use crate::config::CoarseSettings;

use super::dtw::{dtw_distance, zscore};
use super::features::{self, FeatureConfig, FeatureMatrix};
use super::gcc_phat::GccPhat;
use super::pool::CandidatePool;
use super::similarity::{candidate_offsets, cosine_at, nms_radius, non_max_suppression, Scored};
use super::types::{
    AnalysisResult, CoarseResult, CoarseStrategy, FeatureKind, LagEstimate, Peak,
    SearchDiagnostics, SimilarityScoring,
};

/// Strategy names accepted in configuration files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Auto,
    GccPhat,
    Chroma,
    Mfcc,
    ChromaDtw,
    MfccDtw,
}

impl StrategyKind {
    /// Map to a concrete strategy.
    pub fn to_strategy(self) -> CoarseStrategy {
        let similarity = |feature, scoring| CoarseStrategy::Similarity { feature, scoring };
        match self {
            StrategyKind::Auto => CoarseStrategy::Auto,
            StrategyKind::GccPhat => CoarseStrategy::GccPhat,
            StrategyKind::Chroma => similarity(FeatureKind::Chroma, SimilarityScoring::Cosine),
            StrategyKind::Mfcc => similarity(FeatureKind::Mfcc, SimilarityScoring::Cosine),
            StrategyKind::ChromaDtw => similarity(FeatureKind::Chroma, SimilarityScoring::Dtw),
            StrategyKind::MfccDtw => similarity(FeatureKind::Mfcc, SimilarityScoring::Dtw),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(StrategyKind::Auto),
            "gcc-phat" | "gcc" => Ok(StrategyKind::GccPhat),
            "chroma" => Ok(StrategyKind::Chroma),
            "mfcc" => Ok(StrategyKind::Mfcc),
            "chroma-dtw" => Ok(StrategyKind::ChromaDtw),
            "mfcc-dtw" => Ok(StrategyKind::MfccDtw),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Auto => "auto",
            StrategyKind::GccPhat => "gcc-phat",
            StrategyKind::Chroma => "chroma",
            StrategyKind::Mfcc => "mfcc",
            StrategyKind::ChromaDtw => "chroma-dtw",
            StrategyKind::MfccDtw => "mfcc-dtw",
        };
        write!(f, "{name}")
    }
}

/// Which input played the needle in a similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Needle {
    Target,
    Reference,
}

/// Coarse estimator configured once per run.
#[derive(Debug, Clone)]
pub struct CoarseLagEstimator {
    settings: CoarseSettings,
    workers: Option<usize>,
}

impl CoarseLagEstimator {
    pub fn new(settings: CoarseSettings) -> Self {
        Self {
            settings,
            workers: None,
        }
    }

    /// Size of the candidate pool (`None` = available cores).
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn settings(&self) -> &CoarseSettings {
        &self.settings
    }

    /// The configured strategy (possibly `Auto`).
    pub fn strategy(&self) -> CoarseStrategy {
        self.settings.strategy.to_strategy()
    }

    fn auto_similarity(&self) -> CoarseStrategy {
        CoarseStrategy::Similarity {
            feature: self.settings.auto_feature,
            scoring: self.settings.auto_scoring,
        }
    }

    /// Replace `Auto` with the strategy that suits these input lengths.
    pub fn resolve(
        &self,
        strategy: CoarseStrategy,
        reference_len: usize,
        target_len: usize,
        sample_rate: u32,
    ) -> CoarseStrategy {
        match strategy {
            CoarseStrategy::Auto => {
                let max_delta =
                    (self.settings.auto_max_length_delta_secs * sample_rate as f64).max(0.0);
                if reference_len.abs_diff(target_len) as f64 <= max_delta {
                    CoarseStrategy::GccPhat
                } else {
                    self.auto_similarity()
                }
            }
            concrete => concrete,
        }
    }

    /// The strategy to try after `tried` produced no usable estimate.
    pub fn fallback_for(&self, tried: CoarseStrategy) -> CoarseStrategy {
        match tried {
            CoarseStrategy::GccPhat => self.auto_similarity(),
            _ => CoarseStrategy::GccPhat,
        }
    }

    /// Estimate with the configured strategy.
    pub fn estimate(
        &self,
        reference: &[f64],
        target: &[f64],
        sample_rate: u32,
    ) -> AnalysisResult<CoarseResult> {
        self.estimate_with(self.strategy(), reference, target, sample_rate)
    }

    /// Estimate with an explicit strategy.
    ///
    /// Inputs too short for the strategy give [`LagEstimate::unreliable`].
    pub fn estimate_with(
        &self,
        strategy: CoarseStrategy,
        reference: &[f64],
        target: &[f64],
        sample_rate: u32,
    ) -> AnalysisResult<CoarseResult> {
        let strategy = self.resolve(strategy, reference.len(), target.len(), sample_rate);
        tracing::debug!(
            strategy = %strategy,
            reference_len = reference.len(),
            target_len = target.len(),
            "Coarse lag search"
        );

        match strategy {
            CoarseStrategy::GccPhat => {
                let max_window = (self.settings.max_window_secs * sample_rate as f64) as usize;
                GccPhat::new(max_window.max(1), self.settings.min_window_samples)
                    .estimate(reference, target)
            }
            CoarseStrategy::Similarity { feature, scoring } => {
                self.similarity(feature, scoring, reference, target, sample_rate)
            }
            // resolve() never returns Auto
            CoarseStrategy::Auto => Ok(CoarseResult::bare(LagEstimate::unreliable("auto"))),
        }
    }

    fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            n_fft: self.settings.n_fft,
            hop: self.settings.hop,
            n_mels: self.settings.n_mels,
            n_mfcc: self.settings.n_mfcc,
            ..FeatureConfig::default()
        }
    }

    fn similarity(
        &self,
        feature: FeatureKind,
        scoring: SimilarityScoring,
        reference: &[f64],
        target: &[f64],
        sample_rate: u32,
    ) -> AnalysisResult<CoarseResult> {
        let method = CoarseStrategy::Similarity { feature, scoring }.label();
        let unreliable = || Ok(CoarseResult::bare(LagEstimate::unreliable(method.clone())));
        if reference.is_empty() || target.is_empty() {
            return unreliable();
        }

        let config = self.feature_config();
        let reference_features = features::extract(reference, sample_rate, feature, &config);
        let target_features = features::extract(target, sample_rate, feature, &config);

        let (needle_role, mut needle, haystack) = if target_features.len() <= reference_features.len() {
            (Needle::Target, target_features, reference_features)
        } else {
            (Needle::Reference, reference_features, target_features)
        };
        if scoring == SimilarityScoring::Dtw {
            needle.truncate(self.settings.dtw_max_needle_frames.max(1));
        }

        if needle.len() < self.settings.min_needle_frames {
            tracing::debug!(
                needle_frames = needle.len(),
                min = self.settings.min_needle_frames,
                "Needle too short for similarity search"
            );
            return unreliable();
        }

        let offsets = candidate_offsets(haystack.len(), needle.len(), self.settings.candidate_stride);
        if offsets.is_empty() {
            return unreliable();
        }

        let pool = CandidatePool::new(self.workers)?;
        let scores: Vec<Option<f64>> = match scoring {
            SimilarityScoring::Cosine => {
                pool.score_all(&offsets, |&offset| cosine_at(&haystack, &needle, offset))
            }
            SimilarityScoring::Dtw => {
                let needle_z = match zscore(&needle) {
                    Ok(z) => z,
                    Err(e) => {
                        tracing::debug!(error = %e, "Needle is degenerate");
                        return unreliable();
                    }
                };
                let band = self.settings.dtw_band_radius;
                pool.score_all(&offsets, |&offset| {
                    dtw_at(&haystack, &needle_z, offset, band)
                })
            }
        };
        drop(pool);

        let candidates: Vec<Scored> = offsets
            .iter()
            .zip(&scores)
            .filter_map(|(&offset, score)| score.map(|score| Scored { offset, score }))
            .collect();
        let skipped = offsets.len() - candidates.len();

        let higher_is_better = scoring == SimilarityScoring::Cosine;
        let radius = nms_radius(needle.len(), self.settings.nms_ratio);
        let peaks = non_max_suppression(&candidates, radius, higher_is_better, 2);

        let hop = config.hop as i64;
        let to_lag = |offset: usize| match needle_role {
            Needle::Target => -(offset as i64) * hop,
            Needle::Reference => offset as i64 * hop,
        };

        let Some(best) = peaks.first() else {
            tracing::debug!(skipped, "Every candidate was degenerate");
            return Ok(CoarseResult {
                estimate: LagEstimate::unreliable(method),
                diagnostics: SearchDiagnostics {
                    candidates_skipped: skipped,
                    ..SearchDiagnostics::default()
                },
            });
        };

        let confidence = match scoring {
            SimilarityScoring::Cosine => 100.0 * best.score,
            SimilarityScoring::Dtw => 100.0 / (1.0 + best.score.max(0.0)),
        };
        let lag = to_lag(best.offset);
        let runner_up = peaks.get(1).map(|p| Peak {
            lag_samples: to_lag(p.offset),
            score: p.score,
        });

        tracing::debug!(
            method = %method,
            lag,
            score = best.score,
            confidence,
            scored = candidates.len(),
            skipped,
            "Similarity search done"
        );

        Ok(CoarseResult {
            estimate: LagEstimate::new(lag, 0.0, confidence, method),
            diagnostics: SearchDiagnostics {
                best_score: best.score,
                runner_up,
                candidates_scored: candidates.len(),
                candidates_skipped: skipped,
            },
        })
    }
}

/// DTW distance of the z-scored needle against the haystack slice at
/// `offset`; `None` for degenerate slices.
fn dtw_at(
    haystack: &FeatureMatrix,
    needle_z: &FeatureMatrix,
    offset: usize,
    band_radius: usize,
) -> Option<f64> {
    let slice = haystack.get(offset..offset + needle_z.len())?;
    let slice_z = zscore(slice).ok()?;
    dtw_distance(needle_z, &slice_z, band_radius)
}
