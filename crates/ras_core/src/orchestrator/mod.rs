//! Sync orchestrator coordinating the alignment pipeline.
//!
//! A run takes a reference and a target recording at the same sample rate
//! and produces the target on the reference timeline, optionally with the
//! reference removed and residual artifacts gated.
//!
//! # Architecture
//!
//! ```text
//! SyncOrchestrator::run
//!     ├── Step: Coarse   (preprocess + integer lag)
//!     ├── Step: Refine   (sub-sample lag)
//!     ├── Step: Shift    (target onto reference timeline)
//!     ├── Step: Cancel   (optional, spectral subtraction)
//!     └── Step: Expand   (optional, soft gate)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ras_core::config::Settings;
//! use ras_core::{AudioBuffer, SyncOrchestrator};
//!
//! let reference = AudioBuffer::mono(vec![0.0; 48_000], 48_000);
//! let target = AudioBuffer::mono(vec![0.0; 48_000], 48_000);
//!
//! let orchestrator = SyncOrchestrator::new(Settings::default()).with_run_name("clip_01");
//! let result = orchestrator.run(&reference, &target)?;
//! println!("lag: {:.3} samples", result.lag.total());
//! # Ok::<(), ras_core::orchestrator::PipelineError>(())
//! ```

mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

use std::sync::Arc;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use step::SyncStep;
pub use steps::{CancelStep, CoarseStep, ExpandStep, RefineStep, ShiftStep};
pub use types::{
    AlignmentQuality, AlignmentReport, AlignmentResult, CoarseOutput, MatchingCopies,
    ProgressCallback, RunContext, StepOutcome, SyncStage, SyncState, SyncWarning,
};

use crate::audio::AudioBuffer;
use crate::config::Settings;
use crate::logging::{LogConfig, RunLogger};
use crate::preprocess::normalize;

/// Create the standard pipeline with all stages in order.
///
/// 1. Coarse - matching copies and integer lag
/// 2. Refine - phase-slope sub-sample refinement
/// 3. Shift - fractional shift onto the reference timeline
/// 4. Cancel - background cancellation (skipped when disabled)
/// 5. Expand - post expander (skipped when disabled)
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(CoarseStep::new())
        .with_step(RefineStep::new())
        .with_step(ShiftStep::new())
        .with_step(CancelStep::new())
        .with_step(ExpandStep::new())
}

type SharedProgress = Arc<dyn Fn(&str, u32, &str) + Send + Sync>;
type SharedLog = Arc<dyn Fn(&str) + Send + Sync>;

/// Entry point for aligning a target recording to a reference.
///
/// The orchestrator is reusable: every call to [`run`](Self::run) gets a
/// fresh logger and state. One cancel handle is shared by all runs; a
/// request stops the current (or next) run only and is cleared when that
/// run returns.
pub struct SyncOrchestrator {
    settings: Settings,
    run_name: String,
    progress_callback: Option<SharedProgress>,
    log_callback: Option<SharedLog>,
    cancel: CancelHandle,
}

impl SyncOrchestrator {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            run_name: "sync".to_string(),
            progress_callback: None,
            log_callback: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Name used in logs and errors.
    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = name.into();
        self
    }

    /// Receive (stage, percent, message) updates.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, u32, &str) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Receive every formatted log line.
    pub fn with_log_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log_callback = Some(Arc::new(callback));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle to stop a running `run` at the next stage boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Align `target` to `reference`.
    ///
    /// Both inputs must be non-empty and share a sample rate. The output
    /// has the reference's length and the target's channel count. No
    /// partial result is returned on failure.
    pub fn run(&self, reference: &AudioBuffer, target: &AudioBuffer) -> PipelineResult<AlignmentResult> {
        self.validate_inputs(reference, target)?;

        let logger = Arc::new(self.create_logger());
        logger.section(&format!("Run '{}'", self.run_name));
        logger.info(&format!(
            "Reference: {} ch, {:.2}s | Target: {} ch, {:.2}s @ {} Hz",
            reference.channel_count(),
            reference.duration_secs(),
            target.channel_count(),
            target.duration_secs(),
            reference.sample_rate()
        ));

        let (reference, target) = if self.settings.runtime.normalize_inputs {
            (normalize(reference), normalize(target))
        } else {
            (reference.clone(), target.clone())
        };

        let mut ctx = RunContext::new(
            self.settings.clone(),
            self.run_name.clone(),
            reference,
            target,
            Arc::clone(&logger),
        );
        if let Some(callback) = &self.progress_callback {
            let callback = Arc::clone(callback);
            ctx = ctx.with_progress_callback(Box::new(move |stage: &str, percent: u32, message: &str| {
                callback(stage, percent, message)
            }));
        }

        let mut state = SyncState::new(format!(
            "{}-{}",
            self.run_name,
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));

        let pipeline = create_standard_pipeline().with_cancel_handle(self.cancel.clone());
        let outcome = pipeline.run(&ctx, &mut state);
        self.cancel.reset();
        let summary = outcome?;
        logger.debug(&format!(
            "Completed: {:?}, skipped: {:?}",
            summary.steps_completed, summary.steps_skipped
        ));

        state
            .advance(SyncStage::Done)
            .map_err(|e| PipelineError::step_failed(&self.run_name, "Finish", e))?;
        let result = self.build_result(state)?;

        for warning in &result.warnings {
            logger.warn(&warning.to_string());
        }
        logger.success(&format!(
            "Lag {:.3} samples ({:.3} ms), confidence {:.1}",
            result.lag.total(),
            result.delay_ms(),
            result.lag.confidence
        ));
        Ok(result)
    }

    fn validate_inputs(&self, reference: &AudioBuffer, target: &AudioBuffer) -> PipelineResult<()> {
        if reference.is_empty() {
            return Err(PipelineError::validation_failed(&self.run_name, "reference is empty"));
        }
        if target.is_empty() {
            return Err(PipelineError::validation_failed(&self.run_name, "target is empty"));
        }
        if reference.sample_rate() != target.sample_rate() {
            return Err(PipelineError::validation_failed(
                &self.run_name,
                format!(
                    "sample rate mismatch: reference {} Hz vs target {} Hz",
                    reference.sample_rate(),
                    target.sample_rate()
                ),
            ));
        }
        Ok(())
    }

    fn create_logger(&self) -> RunLogger {
        let callback = self.log_callback.as_ref().map(|cb| {
            let cb = Arc::clone(cb);
            Box::new(move |line: &str| cb(line)) as crate::logging::RunLogCallback
        });
        RunLogger::new(
            self.run_name.clone(),
            LogConfig::from(&self.settings.logging),
            callback,
        )
    }

    fn build_result(&self, state: SyncState) -> PipelineResult<AlignmentResult> {
        let missing =
            |what: &str| PipelineError::validation_failed(&self.run_name, format!("{what} missing after run"));

        let audio = state.output().cloned().ok_or_else(|| missing("output audio"))?;
        let lag = state.lag().cloned().ok_or_else(|| missing("lag estimate"))?;
        let quality = state.quality.ok_or_else(|| missing("alignment quality"))?;
        let diagnostics = state
            .coarse
            .map(|c| c.result.diagnostics)
            .unwrap_or_default();

        Ok(AlignmentResult {
            audio,
            lag,
            quality,
            diagnostics,
            stages: state.stages_run,
            warnings: state.warnings,
        })
    }
}
