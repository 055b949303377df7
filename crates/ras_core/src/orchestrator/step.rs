//! Sync step trait definition.
//!
//! All stages implement this trait, providing a consistent interface for
//! validation and execution.

use super::errors::StepResult;
use super::types::{RunContext, StepOutcome, SyncStage, SyncState};

/// Trait for pipeline stages.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before execution
/// 2. `execute` - Perform the stage's work
/// 3. `validate_output` - Verify the stage recorded its output
///
/// After a successful stage the runner moves the state to
/// [`produces`](SyncStep::produces); skipped stages leave it unchanged.
///
/// # Example
///
/// ```ignore
/// struct GainStep;
///
/// impl SyncStep for GainStep {
///     fn name(&self) -> &str { "Gain" }
///
///     fn produces(&self) -> SyncStage { SyncStage::Expanded }
///
///     fn validate_input(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
///         state.aligned.as_ref().map(|_| ()).ok_or_else(|| {
///             StepError::precondition_failed("nothing aligned yet")
///         })
///     }
///
///     fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome> {
///         // ...
///         Ok(StepOutcome::Success)
///     }
///
///     fn validate_output(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait SyncStep: Send + Sync {
    /// Get the step name (for logging and error context).
    fn name(&self) -> &str;

    /// Stage the run is in once this step succeeds.
    fn produces(&self) -> SyncStage;

    /// Validate inputs before execution.
    ///
    /// Should check that earlier stages recorded what this one reads.
    fn validate_input(&self, ctx: &RunContext, state: &SyncState) -> StepResult<()>;

    /// Execute the stage's main work and record results in `state`.
    ///
    /// Returns `StepOutcome::Skipped` when the stage is disabled (not an
    /// error).
    fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome>;

    /// Validate outputs after execution.
    ///
    /// Called after `execute` returns `Success`.
    fn validate_output(&self, ctx: &RunContext, state: &SyncState) -> StepResult<()>;

    /// Whether this stage can be disabled through settings.
    fn is_optional(&self) -> bool {
        false
    }

    /// Human-readable description of what this stage does.
    fn description(&self) -> &str {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStep {
        name: &'static str,
        should_skip: bool,
    }

    impl SyncStep for MockStep {
        fn name(&self) -> &str {
            self.name
        }

        fn produces(&self) -> SyncStage {
            SyncStage::Refined
        }

        fn validate_input(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &RunContext, _state: &mut SyncState) -> StepResult<StepOutcome> {
            if self.should_skip {
                Ok(StepOutcome::Skipped("Test skip".to_string()))
            } else {
                Ok(StepOutcome::Success)
            }
        }

        fn validate_output(&self, _ctx: &RunContext, _state: &SyncState) -> StepResult<()> {
            Ok(())
        }
    }

    #[test]
    fn step_trait_object_works() {
        let step: Box<dyn SyncStep> = Box::new(MockStep {
            name: "TestStep",
            should_skip: false,
        });

        assert_eq!(step.name(), "TestStep");
        assert_eq!(step.description(), "TestStep");
        assert!(!step.is_optional());
        assert_eq!(step.produces(), SyncStage::Refined);
    }
}
