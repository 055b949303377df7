//! Shift step - moves the target onto the reference timeline.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::SyncStep;
use crate::orchestrator::types::{
    AlignmentQuality, RunContext, StepOutcome, SyncStage, SyncState,
};
use crate::shift::FractionalShifter;

/// Applies the negated lag to every target channel.
pub struct ShiftStep;

impl ShiftStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShiftStep {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStep for ShiftStep {
    fn name(&self) -> &str {
        "Shift"
    }

    fn produces(&self) -> SyncStage {
        SyncStage::Shifted
    }

    fn description(&self) -> &str {
        "Shift the target onto the reference timeline"
    }

    fn validate_input(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        if state.refined.is_none() {
            return Err(StepError::precondition_failed("refine stage has not run"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome> {
        let Some(lag) = state.refined.as_ref().map(|r| &r.estimate) else {
            return Err(StepError::precondition_failed("refine stage has not run"));
        };

        let shifter = FractionalShifter::new(ctx.settings.shift.pad_margin);
        let target_len = ctx.reference.len();
        // A delayed target is pulled forward by its lag
        let aligned = shifter.apply_lag_buffer(&ctx.target, -lag.integer, -lag.fractional, target_len);

        let quality = AlignmentQuality::measure(&ctx.reference.mono_samples(), &aligned.mono_samples());
        ctx.logger.info(&format!(
            "Aligned {} channel(s); similarity {:.4}, residual {:.4}",
            aligned.channel_count(),
            quality.similarity,
            quality.residual_error
        ));

        state.aligned = Some(aligned);
        state.quality = Some(quality);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        match &state.aligned {
            Some(aligned) if aligned.len() == ctx.reference.len() => Ok(()),
            Some(aligned) => Err(StepError::invalid_output(format!(
                "aligned length {} differs from reference length {}",
                aligned.len(),
                ctx.reference.len()
            ))),
            None => Err(StepError::invalid_output("aligned audio not recorded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_step_has_correct_name() {
        assert_eq!(ShiftStep::new().name(), "Shift");
        assert!(!ShiftStep::new().is_optional());
    }
}
