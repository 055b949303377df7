//! Expand step - soft gating of residual artifacts.

use crate::expander::{expand, ExpanderParams};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::SyncStep;
use crate::orchestrator::types::{RunContext, StepOutcome, SyncStage, SyncState};

/// Post expander over the cleaned (or aligned) target.
pub struct ExpandStep;

impl ExpandStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExpandStep {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStep for ExpandStep {
    fn name(&self) -> &str {
        "Expand"
    }

    fn produces(&self) -> SyncStage {
        SyncStage::Expanded
    }

    fn description(&self) -> &str {
        "Apply the soft expander"
    }

    fn validate_input(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        if state.output().is_none() {
            return Err(StepError::precondition_failed("no aligned audio to expand"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome> {
        let settings = &ctx.settings.expand;
        if !settings.enabled {
            return Ok(StepOutcome::Skipped("expander disabled".to_string()));
        }
        let Some(input) = state.cleaned.as_ref().or(state.aligned.as_ref()) else {
            return Err(StepError::precondition_failed("no aligned audio to expand"));
        };

        let params = ExpanderParams::from(settings);
        ctx.logger.info(&format!(
            "Expander threshold {:.1} dB, ratio {:.2}, release {:.0} ms",
            params.threshold_db, params.ratio, params.release_ms
        ));
        let expanded = expand(input, &params);

        state.expanded = Some(expanded);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        if state.expanded.is_none() {
            return Err(StepError::invalid_output("expanded audio not recorded"));
        }
        Ok(())
    }

    fn is_optional(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_step_is_optional() {
        let step = ExpandStep::new();
        assert_eq!(step.name(), "Expand");
        assert!(step.is_optional());
    }
}
