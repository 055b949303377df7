//! Pipeline runner that executes stages in sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::{PipelineError, PipelineResult, StepError};
use super::step::SyncStep;
use super::types::{RunContext, StepOutcome, SyncStage, SyncState};

/// Pipeline that runs a sequence of stages.
///
/// Each stage is validated before and after it runs. Cancellation is
/// checked at stage boundaries only.
pub struct Pipeline {
    steps: Vec<Box<dyn SyncStep>>,
    cancel: CancelHandle,
}

impl Pipeline {
    /// Create a new empty pipeline with its own cancel handle.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Share an existing cancel handle.
    pub fn with_cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: SyncStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: SyncStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the pipeline at the
    /// next stage boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Check if pipeline has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run every stage against `state`.
    ///
    /// For each stage:
    /// 1. Check for cancellation
    /// 2. Run `validate_input`
    /// 3. Run `execute`
    /// 4. Run `validate_output` (if execute returned Success)
    /// 5. Advance the state to the step's stage
    pub fn run(&self, ctx: &RunContext, state: &mut SyncState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            steps_completed: Vec::new(),
            steps_skipped: Vec::new(),
        };

        let total_steps = self.steps.len().max(1);

        for (i, step) in self.steps.iter().enumerate() {
            if self.is_cancelled() {
                ctx.logger
                    .warn(&format!("Pipeline cancelled before stage '{}'", step.name()));
                return Err(PipelineError::cancelled(&ctx.run_name));
            }

            let step_name = step.name();
            ctx.logger.stage(step_name);

            let percent = ((i as f64 / total_steps as f64) * 100.0) as u32;
            ctx.report_progress(step_name, percent, &format!("Starting {}", step.description()));
            ctx.logger.progress(percent);

            ctx.logger
                .debug(&format!("Validating input for '{}'", step_name));
            if let Err(e) = step.validate_input(ctx, state) {
                ctx.logger.error(&format!("Input validation failed: {}", e));
                return Err(self.fail(ctx, step_name, e));
            }

            ctx.logger.debug(&format!("Executing '{}'", step_name));
            let outcome = match step.execute(ctx, state) {
                Ok(outcome) => outcome,
                Err(e) => {
                    ctx.logger.error(&format!("Execution failed: {}", e));
                    return Err(self.fail(ctx, step_name, e));
                }
            };

            match outcome {
                StepOutcome::Success => {
                    ctx.logger
                        .debug(&format!("Validating output for '{}'", step_name));
                    if let Err(e) = step.validate_output(ctx, state) {
                        ctx.logger.error(&format!("Output validation failed: {}", e));
                        return Err(self.fail(ctx, step_name, e));
                    }

                    if let Err(e) = state.advance(step.produces()) {
                        ctx.logger.error(&format!("Stage order violated: {}", e));
                        return Err(self.fail(ctx, step_name, e));
                    }

                    ctx.logger.success(&format!("{} completed", step_name));
                    result.steps_completed.push(step_name.to_string());
                }
                StepOutcome::Skipped(reason) => {
                    ctx.logger.info(&format!("{} skipped: {}", step_name, reason));
                    result.steps_skipped.push(step_name.to_string());
                }
            }
        }

        ctx.report_progress("Complete", 100, "Pipeline finished");
        ctx.logger.progress(100);
        Ok(result)
    }

    fn fail(&self, ctx: &RunContext, step_name: &str, error: StepError) -> PipelineError {
        ctx.logger.show_tail(&ctx.run_name);
        PipelineError::step_failed(&ctx.run_name, step_name, error)
    }

    /// Get the number of steps in the pipeline.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for cancelling a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pipeline.
    ///
    /// The pipeline will stop at the next stage boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the handle can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    /// Steps that completed successfully.
    pub steps_completed: Vec<String>,
    /// Steps that were skipped.
    pub steps_skipped: Vec<String>,
}

impl PipelineRunResult {
    /// Check if all steps completed (none skipped).
    pub fn all_completed(&self) -> bool {
        self.steps_skipped.is_empty()
    }

    /// Total number of steps that ran.
    pub fn total_steps(&self) -> usize {
        self.steps_completed.len() + self.steps_skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::config::Settings;
    use crate::logging::{LogConfig, RunLogger};
    use crate::orchestrator::errors::StepResult;
    use std::sync::atomic::AtomicUsize;

    struct CountingStep {
        name: &'static str,
        stage: SyncStage,
        execute_count: Arc<AtomicUsize>,
        cancel_after: Option<CancelHandle>,
    }

    impl SyncStep for CountingStep {
        fn name(&self) -> &str {
            self.name
        }

        fn produces(&self) -> SyncStage {
            self.stage
        }

        fn validate_input(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &RunContext, _state: &mut SyncState) -> StepResult<StepOutcome> {
            self.execute_count.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = &self.cancel_after {
                handle.cancel();
            }
            Ok(StepOutcome::Success)
        }

        fn validate_output(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
            Ok(())
        }
    }

    struct FailingStep;

    impl SyncStep for FailingStep {
        fn name(&self) -> &str {
            "Failing"
        }

        fn produces(&self) -> SyncStage {
            SyncStage::CoarseEstimated
        }

        fn validate_input(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &RunContext, _state: &mut SyncState) -> StepResult<StepOutcome> {
            Err(StepError::invalid_input("boom"))
        }

        fn validate_output(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
            Ok(())
        }
    }

    fn context() -> RunContext {
        let buffer = AudioBuffer::mono(vec![0.0; 16], 8000);
        RunContext::new(
            Settings::default(),
            "test_run",
            buffer.clone(),
            buffer,
            Arc::new(RunLogger::new("test_run", LogConfig::silent(), None)),
        )
    }

    fn counting(name: &'static str, stage: SyncStage, count: &Arc<AtomicUsize>) -> CountingStep {
        CountingStep {
            name,
            stage,
            execute_count: Arc::clone(count),
            cancel_after: None,
        }
    }

    #[test]
    fn pipeline_builds_correctly() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with_step(counting("Step1", SyncStage::CoarseEstimated, &count))
            .with_step(counting("Step2", SyncStage::Refined, &count));

        assert_eq!(pipeline.step_count(), 2);
        assert_eq!(pipeline.step_names(), vec!["Step1", "Step2"]);
    }

    #[test]
    fn runs_every_step_in_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with_step(counting("Step1", SyncStage::CoarseEstimated, &count))
            .with_step(counting("Step2", SyncStage::Refined, &count));

        let mut state = SyncState::new("r");
        let result = pipeline.run(&context(), &mut state).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(result.steps_completed, vec!["Step1", "Step2"]);
        assert!(result.all_completed());
        assert_eq!(state.stage, SyncStage::Refined);
    }

    #[test]
    fn out_of_order_stage_fails() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with_step(counting("Late", SyncStage::Shifted, &count))
            .with_step(counting("Early", SyncStage::Refined, &count));

        let err = pipeline.run(&context(), &mut SyncState::new("r")).unwrap_err();
        assert!(err.to_string().contains("Early"));
    }

    #[test]
    fn cancel_handle_works() {
        let pipeline = Pipeline::new();
        let handle = pipeline.cancel_handle();

        assert!(!pipeline.is_cancelled());
        handle.cancel();
        assert!(pipeline.is_cancelled());
        handle.reset();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn cancellation_stops_at_next_boundary() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = CancelHandle::new();
        let pipeline = Pipeline::new()
            .with_cancel_handle(handle.clone())
            .with_step(CountingStep {
                name: "Step1",
                stage: SyncStage::CoarseEstimated,
                execute_count: Arc::clone(&count),
                cancel_after: Some(handle.clone()),
            })
            .with_step(counting("Step2", SyncStage::Refined, &count));

        let err = pipeline.run(&context(), &mut SyncState::new("r")).unwrap_err();
        assert!(err.is_cancelled());
        // The running stage finished; the next one never started
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_names_the_step() {
        let pipeline = Pipeline::new().with_step(FailingStep);
        let err = pipeline.run(&context(), &mut SyncState::new("r")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Failing"));
        assert!(msg.contains("test_run"));
    }
}
