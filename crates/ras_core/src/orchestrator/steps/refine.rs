//! Refine step - sub-sample refinement of the coarse lag.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::SyncStep;
use crate::orchestrator::types::{RunContext, StepOutcome, SyncStage, SyncState, SyncWarning};
use crate::refine::{FineLagRefiner, RefineWarning};

/// Phase-slope refinement of the coarse estimate.
pub struct RefineStep;

impl RefineStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RefineStep {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStep for RefineStep {
    fn name(&self) -> &str {
        "Refine"
    }

    fn produces(&self) -> SyncStage {
        SyncStage::Refined
    }

    fn description(&self) -> &str {
        "Refine the lag to sub-sample precision"
    }

    fn validate_input(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        if state.coarse.is_none() || state.matching.is_none() {
            return Err(StepError::precondition_failed("coarse stage has not run"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome> {
        let (Some(matching), Some(coarse)) = (&state.matching, &state.coarse) else {
            return Err(StepError::precondition_failed("coarse stage has not run"));
        };

        let refiner = FineLagRefiner::new(ctx.settings.refine.clone());
        let refinement = refiner.refine(
            &matching.reference,
            &matching.target,
            &coarse.result.estimate,
            ctx.sample_rate(),
        )?;

        for warning in &refinement.warnings {
            let mapped = match warning {
                RefineWarning::NoUsableFrames => {
                    ctx.logger
                        .warn("No usable refinement frame; kept coarse integer lag");
                    SyncWarning::LowConfidence {
                        stage: "refine".to_string(),
                        confidence: 0.0,
                        threshold: ctx.settings.coarse.min_confidence,
                    }
                }
                RefineWarning::DegenerateFrames { skipped, total } => {
                    SyncWarning::DegenerateSkipped {
                        stage: "refine".to_string(),
                        skipped: *skipped,
                        total: *total,
                    }
                }
                RefineWarning::WideSpread { spread } => {
                    ctx.logger
                        .warn(&format!("Frame delays spread {:.3} samples", spread));
                    SyncWarning::WideSpread { spread: *spread }
                }
                RefineWarning::CorrectionRejected { correction } => {
                    SyncWarning::CorrectionRejected {
                        correction: *correction,
                    }
                }
            };
            state.warnings.push(mapped);
        }

        let estimate = &refinement.estimate;
        ctx.logger.info(&format!(
            "Refined lag {:.3} samples ({:.3} ms) from {} frames",
            estimate.total(),
            estimate.delay_ms(ctx.sample_rate()),
            refinement.frames_used
        ));

        state.refined = Some(refinement);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        let Some(refined) = &state.refined else {
            return Err(StepError::invalid_output("refined estimate not recorded"));
        };
        let fractional = refined.estimate.fractional;
        if !(-0.5..0.5).contains(&fractional) {
            return Err(StepError::invalid_output(format!(
                "fractional lag {} outside [-0.5, 0.5)",
                fractional
            )));
        }
        Ok(())
    }
}
