//! Cancel step - removes the reference bleed-through from the aligned target.

use crate::cancel::BackgroundCanceller;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::SyncStep;
use crate::orchestrator::types::{RunContext, StepOutcome, SyncStage, SyncState};

/// Soft spectral subtraction of the reference.
pub struct CancelStep;

impl CancelStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CancelStep {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStep for CancelStep {
    fn name(&self) -> &str {
        "Cancel"
    }

    fn produces(&self) -> SyncStage {
        SyncStage::Cancelled
    }

    fn description(&self) -> &str {
        "Subtract the reference from the aligned target"
    }

    fn validate_input(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        if state.aligned.is_none() {
            return Err(StepError::precondition_failed("shift stage has not run"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome> {
        let settings = &ctx.settings.cancel;
        if !settings.enabled {
            return Ok(StepOutcome::Skipped("cancellation disabled".to_string()));
        }
        let Some(aligned) = &state.aligned else {
            return Err(StepError::precondition_failed("shift stage has not run"));
        };

        let canceller = BackgroundCanceller::from(settings);
        ctx.logger.info(&format!(
            "Spectral subtraction alpha={:.3} beta={:.3}",
            canceller.alpha, canceller.beta
        ));
        let cleaned = canceller.cancel(&ctx.reference, aligned)?;

        state.cleaned = Some(cleaned);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        match (&state.cleaned, &state.aligned) {
            (Some(cleaned), Some(aligned)) if cleaned.len() == aligned.len() => Ok(()),
            _ => Err(StepError::invalid_output("cleaned audio missing or wrong length")),
        }
    }

    fn is_optional(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_step_is_optional() {
        let step = CancelStep::new();
        assert_eq!(step.name(), "Cancel");
        assert!(step.is_optional());
    }
}
