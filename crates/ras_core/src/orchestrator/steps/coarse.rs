//! Coarse step - prepares the matching copies and estimates the integer lag.

use crate::analysis::{AnalysisError, CoarseLagEstimator, CoarseStrategy};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::SyncStep;
use crate::orchestrator::types::{
    CoarseOutput, MatchingCopies, RunContext, StepOutcome, SyncStage, SyncState, SyncWarning,
};
use crate::preprocess::prepare_for_matching;

/// Coarse lag search with optional strategy fallback.
pub struct CoarseStep;

impl CoarseStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoarseStep {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStep for CoarseStep {
    fn name(&self) -> &str {
        "Coarse"
    }

    fn produces(&self) -> SyncStage {
        SyncStage::CoarseEstimated
    }

    fn description(&self) -> &str {
        "Estimate the integer lag between reference and target"
    }

    fn validate_input(&self, ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        if state.stage != SyncStage::Loaded {
            return Err(StepError::precondition_failed(format!(
                "coarse search expects a freshly loaded run, found {}",
                state.stage
            )));
        }
        if ctx.reference.is_empty() || ctx.target.is_empty() {
            return Err(StepError::invalid_input("reference and target must not be empty"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &RunContext, state: &mut SyncState) -> StepResult<StepOutcome> {
        let settings = &ctx.settings;
        let sample_rate = ctx.sample_rate();

        let matching = MatchingCopies {
            reference: prepare_for_matching(&ctx.reference, &settings.preprocess)?,
            target: prepare_for_matching(&ctx.target, &settings.preprocess)?,
        };

        let estimator = CoarseLagEstimator::new(settings.coarse.clone())
            .with_workers(settings.runtime.worker_count());
        let strategy = estimator.resolve(
            estimator.strategy(),
            matching.reference.len(),
            matching.target.len(),
            sample_rate,
        );
        ctx.logger.info(&format!("Strategy: {}", strategy));

        let mut result =
            estimator.estimate_with(strategy, &matching.reference, &matching.target, sample_rate)?;
        let mut fallback_used = false;

        if result.estimate.is_unreliable() && settings.coarse.allow_fallback {
            let fallback = estimator.fallback_for(strategy);
            ctx.logger.warn(&format!(
                "{} produced no estimate, trying {}",
                strategy, fallback
            ));
            result =
                estimator.estimate_with(fallback, &matching.reference, &matching.target, sample_rate)?;
            fallback_used = true;
            state.warnings.push(SyncWarning::FallbackUsed {
                from: strategy.label(),
                to: fallback.label(),
            });
        }

        if result.estimate.is_unreliable() {
            return Err(StepError::from(AnalysisError::NoReliableEstimate(format!(
                "coarse search ({}) found no usable lag",
                describe(strategy, fallback_used)
            ))));
        }

        let estimate = &result.estimate;
        ctx.logger.info(&format!(
            "Coarse lag {} samples ({:.2} ms), confidence {:.1} via {}",
            estimate.integer,
            estimate.delay_ms(sample_rate),
            estimate.confidence,
            estimate.method
        ));

        let threshold = settings.coarse.min_confidence;
        if estimate.confidence < threshold {
            ctx.logger.warn(&format!(
                "Low coarse confidence {:.1} (< {:.1}), continuing",
                estimate.confidence, threshold
            ));
            state.warnings.push(SyncWarning::LowConfidence {
                stage: "coarse".to_string(),
                confidence: estimate.confidence,
                threshold,
            });
        }

        let diagnostics = &result.diagnostics;
        if diagnostics.candidates_skipped > 0 {
            state.warnings.push(SyncWarning::DegenerateSkipped {
                stage: "coarse".to_string(),
                skipped: diagnostics.candidates_skipped,
                total: diagnostics.candidates_scored + diagnostics.candidates_skipped,
            });
        }
        if let Some(runner_up) = &diagnostics.runner_up {
            ctx.logger.debug(&format!(
                "Runner-up lag {} (score {:.4})",
                runner_up.lag_samples, runner_up.score
            ));
        }

        state.matching = Some(matching);
        state.coarse = Some(CoarseOutput {
            result,
            fallback_used,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &RunContext, state: &SyncState) -> StepResult<()> {
        match (&state.coarse, &state.matching) {
            (Some(coarse), Some(_)) if !coarse.result.estimate.is_unreliable() => Ok(()),
            _ => Err(StepError::invalid_output("coarse estimate not recorded")),
        }
    }
}

fn describe(strategy: CoarseStrategy, fallback_used: bool) -> String {
    if fallback_used {
        format!("{} and fallback", strategy)
    } else {
        strategy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_step_has_correct_name() {
        let step = CoarseStep::new();
        assert_eq!(step.name(), "Coarse");
        assert!(!step.is_optional());
    }

    #[test]
    fn describe_mentions_fallback() {
        assert_eq!(describe(CoarseStrategy::GccPhat, false), "gcc_phat");
        assert_eq!(describe(CoarseStrategy::GccPhat, true), "gcc_phat and fallback");
    }
}
