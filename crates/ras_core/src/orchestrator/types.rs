//! Core types for the sync pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{CoarseResult, LagEstimate, SearchDiagnostics};
use crate::audio::AudioBuffer;
use crate::config::Settings;
use crate::logging::RunLogger;
use crate::refine::Refinement;

use super::errors::{StepError, StepResult};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (stage_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Read-only context passed to pipeline steps.
///
/// Holds the inputs and configuration of one run. Mutable results go in
/// [`SyncState`].
pub struct RunContext {
    /// Application settings.
    pub settings: Settings,
    /// Run name (for logs and errors).
    pub run_name: String,
    /// Full-channel reference recording.
    pub reference: AudioBuffer,
    /// Full-channel target recording.
    pub target: AudioBuffer,
    /// Per-run logger.
    pub logger: Arc<RunLogger>,
    /// Optional progress callback.
    progress_callback: Option<ProgressCallback>,
}

impl RunContext {
    /// Create a new context for a run.
    pub fn new(
        settings: Settings,
        run_name: impl Into<String>,
        reference: AudioBuffer,
        target: AudioBuffer,
        logger: Arc<RunLogger>,
    ) -> Self {
        Self {
            settings,
            run_name: run_name.into(),
            reference,
            target,
            logger,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, stage_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(stage_name, percent, message);
        }
    }

    /// Shared sample rate of the inputs.
    pub fn sample_rate(&self) -> u32 {
        self.reference.sample_rate()
    }
}

/// Pipeline position. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Inputs validated.
    #[default]
    Loaded,
    CoarseEstimated,
    Refined,
    Shifted,
    /// Background cancellation done.
    Cancelled,
    Expanded,
    Done,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncStage::Loaded => "loaded",
            SyncStage::CoarseEstimated => "coarse_estimated",
            SyncStage::Refined => "refined",
            SyncStage::Shifted => "shifted",
            SyncStage::Cancelled => "cancelled",
            SyncStage::Expanded => "expanded",
            SyncStage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Non-fatal observations carried in the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// A stage produced an estimate below the confidence threshold.
    LowConfidence {
        stage: String,
        confidence: f64,
        threshold: f64,
    },
    /// Frames or candidates were skipped as numerically degenerate.
    DegenerateSkipped {
        stage: String,
        skipped: usize,
        total: usize,
    },
    /// The configured strategy failed and the other one was used.
    FallbackUsed { from: String, to: String },
    /// Fine frame delays disagree (median absolute deviation, samples).
    WideSpread { spread: f64 },
    /// A local integer correction was out of range and ignored.
    CorrectionRejected { correction: i64 },
}

impl std::fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncWarning::LowConfidence {
                stage,
                confidence,
                threshold,
            } => write!(
                f,
                "{stage}: low confidence {confidence:.1} (threshold {threshold:.1})"
            ),
            SyncWarning::DegenerateSkipped {
                stage,
                skipped,
                total,
            } => write!(f, "{stage}: skipped {skipped} of {total} degenerate items"),
            SyncWarning::FallbackUsed { from, to } => {
                write!(f, "coarse: {from} gave no estimate, used {to}")
            }
            SyncWarning::WideSpread { spread } => {
                write!(f, "refine: frame delays spread {spread:.3} samples")
            }
            SyncWarning::CorrectionRejected { correction } => {
                write!(f, "refine: integer correction {correction} rejected")
            }
        }
    }
}

/// Mono copies used for estimation.
#[derive(Debug, Clone)]
pub struct MatchingCopies {
    pub reference: Vec<f64>,
    pub target: Vec<f64>,
}

/// Output of the coarse stage.
#[derive(Debug, Clone)]
pub struct CoarseOutput {
    pub result: CoarseResult,
    /// Whether the fallback strategy produced the result.
    pub fallback_used: bool,
}

/// Alignment quality against the reference (mono, zero lag).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentQuality {
    /// `||r/|r| - t/|t|||^2`, 0 (identical) to 4 (inverted).
    pub residual_error: f64,
    /// Normalized correlation at zero lag.
    pub similarity: f64,
}

impl AlignmentQuality {
    /// Compare two equally long mono signals. Silent inputs score 0.
    pub fn measure(reference: &[f64], aligned: &[f64]) -> Self {
        let dot: f64 = reference.iter().zip(aligned).map(|(a, b)| a * b).sum();
        let er: f64 = reference.iter().map(|v| v * v).sum();
        let ea: f64 = aligned.iter().map(|v| v * v).sum();
        let denom = (er * ea).sqrt();
        let similarity = if denom > 1e-20 && denom.is_finite() {
            (dot / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Self {
            residual_error: 2.0 * (1.0 - similarity),
            similarity,
        }
    }
}

/// Mutable state that accumulates results from pipeline stages.
///
/// This is a write-once manifest: each stage fills its own section and
/// the stage marker only moves forward.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    /// Unique run identifier.
    pub run_id: String,
    /// When the run started.
    pub started_at: Option<String>,
    /// Current position.
    pub stage: SyncStage,
    /// Stages that ran, in order.
    pub stages_run: Vec<SyncStage>,
    /// Mono estimation copies (coarse stage).
    pub matching: Option<MatchingCopies>,
    /// Coarse estimate (coarse stage).
    pub coarse: Option<CoarseOutput>,
    /// Refined estimate (refine stage).
    pub refined: Option<Refinement>,
    /// Target on the reference timeline (shift stage).
    pub aligned: Option<AudioBuffer>,
    /// Alignment quality of `aligned` (shift stage).
    pub quality: Option<AlignmentQuality>,
    /// Target with the reference removed (cancel stage).
    pub cleaned: Option<AudioBuffer>,
    /// Expander output (expand stage).
    pub expanded: Option<AudioBuffer>,
    /// Warnings from every stage.
    pub warnings: Vec<SyncWarning>,
}

impl SyncState {
    /// Create a new state with the given ID.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            stages_run: vec![SyncStage::Loaded],
            ..Default::default()
        }
    }

    /// Move to `next`; moving backwards or standing still is an error.
    pub fn advance(&mut self, next: SyncStage) -> StepResult<()> {
        if next <= self.stage {
            return Err(StepError::precondition_failed(format!(
                "cannot move from {} to {}",
                self.stage, next
            )));
        }
        self.stage = next;
        self.stages_run.push(next);
        Ok(())
    }

    /// The latest lag estimate (refined if available).
    pub fn lag(&self) -> Option<&LagEstimate> {
        self.refined
            .as_ref()
            .map(|r| &r.estimate)
            .or_else(|| self.coarse.as_ref().map(|c| &c.result.estimate))
    }

    /// The most processed output so far.
    pub fn output(&self) -> Option<&AudioBuffer> {
        self.expanded
            .as_ref()
            .or(self.cleaned.as_ref())
            .or(self.aligned.as_ref())
    }
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step was skipped (disabled, not an error).
    Skipped(String),
}

/// Final product of a successful run.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// Target on the reference timeline (cleaned/expanded when enabled).
    pub audio: AudioBuffer,
    /// Final lag of the target relative to the reference.
    pub lag: LagEstimate,
    /// Quality of the alignment before cancellation.
    pub quality: AlignmentQuality,
    /// Coarse search details.
    pub diagnostics: SearchDiagnostics,
    /// Stages that ran, in order.
    pub stages: Vec<SyncStage>,
    pub warnings: Vec<SyncWarning>,
}

impl AlignmentResult {
    /// Lag in milliseconds.
    pub fn delay_ms(&self) -> f64 {
        self.lag.delay_ms(self.audio.sample_rate())
    }

    /// Serializable summary (no audio).
    pub fn report(&self) -> AlignmentReport {
        AlignmentReport {
            integer_lag: self.lag.integer,
            fractional_lag: self.lag.fractional,
            total_lag: self.lag.total(),
            delay_ms: self.delay_ms(),
            confidence: self.lag.confidence,
            method: self.lag.method.clone(),
            residual_error: self.quality.residual_error,
            similarity: self.quality.similarity,
            sample_rate: self.audio.sample_rate(),
            channels: self.audio.channel_count(),
            frames: self.audio.len(),
            stages: self.stages.clone(),
            warnings: self.warnings.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

/// JSON-friendly run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub integer_lag: i64,
    pub fractional_lag: f64,
    pub total_lag: f64,
    pub delay_ms: f64,
    pub confidence: f64,
    pub method: String,
    pub residual_error: f64,
    pub similarity: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
    pub stages: Vec<SyncStage>,
    pub warnings: Vec<SyncWarning>,
    pub diagnostics: SearchDiagnostics,
}
