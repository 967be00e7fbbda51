//! P5b Confidence Reranker (spec.md §4.7): a judge panel that can only move
//! the match score down, never up, bounded to
//! `[match_score - max_downward_adjustment, match_score]`. Derives the
//! final tier from the calibrated score rather than trusting the judges'
//! own tier label, so the tier/score consistency invariant always holds.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::{LlmHandle, ParallelScorer, PromptLoader};
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::Phase;
use crate::pipeline::state::{ModelClass, PipelineState, Tier};

#[derive(Debug, Deserialize)]
struct JudgeVote {
    #[serde(default)]
    downward_adjustment: i32,
    #[serde(default)]
    rationale: String,
}

async fn run_judge(
    llm: &LlmHandle,
    model_class: ModelClass,
    lens: &'static str,
    state: &PipelineState,
) -> Option<JudgeVote> {
    let system_prompt = PromptLoader::load("confidence_reranker", model_class).ok()?;
    let mut params = HashMap::new();
    params.insert("lens", lens.to_string());
    params.insert("match_score", state.match_score.unwrap_or(0).to_string());
    params.insert("matched", state.matched.join(", "));
    params.insert("unmatched", state.unmatched.join(", "));
    params.insert(
        "gaps",
        state.gaps.iter().map(|g| format!("{} ({:?})", g.requirement, g.severity)).collect::<Vec<_>>().join("; "),
    );
    let user_prompt = PromptLoader::render(&system_prompt, &params);
    llm.complete_json(model_class, &system_prompt, &user_prompt).await.ok()
}

/// Averages the panel's downward votes, bounds the average to
/// `max_down`, and applies it -- the score can only move down from
/// `match_score`, never up (spec.md §4.7).
fn calibrate(match_score: i32, downward_adjustments: &[i32], max_down: i32) -> i32 {
    let average_down = if downward_adjustments.is_empty() {
        0
    } else {
        downward_adjustments.iter().sum::<i32>() / downward_adjustments.len() as i32
    };
    let bounded_down = average_down.clamp(0, max_down);
    (match_score - bounded_down).clamp(match_score - max_down, match_score)
}

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    ctx.emit(PipelineEvent::phase_start(Phase::ConfidenceReranker, 1)).await;

    let Some(match_score) = state.match_score else {
        // No score to calibrate -- e.g. the refusal short-circuit path
        // reached this phase somehow. Leave calibrated_score unset.
        state.tier = Some(Tier::InsufficientData);
        ctx.emit(PipelineEvent::phase_complete(
            Phase::ConfidenceReranker,
            PhaseCompleteData::ConfidenceReranker {
                calibrated_score: None,
                tier: Tier::InsufficientData,
                adjustment_rationale: "no score to calibrate".to_string(),
            },
        ))
        .await;
        return Ok(());
    };

    const LENSES: &[&str] = &["evidence_strength", "risk_severity", "data_completeness"];

    let scorer = ParallelScorer::new(ctx.config.pipeline.judge_concurrency);
    let llm = ctx.llm.clone();
    let model_class = state.model_class;
    let snapshot = state.clone();

    let jobs: Vec<_> = LENSES
        .iter()
        .copied()
        .map(|lens| {
            let llm = llm.clone();
            let snapshot = snapshot.clone();
            move || async move { run_judge(&llm, model_class, lens, &snapshot).await }
        })
        .collect();

    let votes = scorer.run(jobs, ctx.cancel_rx.clone()).await;

    let max_down = ctx.config.pipeline.max_downward_adjustment;
    let mut downward_adjustments = Vec::new();
    let mut rationales = Vec::new();
    for vote in votes.into_iter().flatten().flatten() {
        downward_adjustments.push(vote.downward_adjustment.max(0));
        if !vote.rationale.trim().is_empty() {
            rationales.push(vote.rationale);
        }
    }

    let calibrated = calibrate(match_score, &downward_adjustments, max_down);

    state.calibrated_score = Some(calibrated);
    state.tier = Some(Tier::from_score(calibrated));
    state.adjustment_rationale = if rationales.is_empty() {
        "No downward adjustment warranted by the confidence panel.".to_string()
    } else {
        rationales.join(" ")
    };

    if calibrated != match_score {
        ctx.emit_reasoning(format!(
            "confidence panel adjusted match score from {match_score} to {calibrated}: {}",
            state.adjustment_rationale
        ))
        .await;
    }

    ctx.emit(PipelineEvent::phase_complete(
        Phase::ConfidenceReranker,
        PhaseCompleteData::ConfidenceReranker {
            calibrated_score: Some(calibrated),
            tier: state.tier.unwrap_or(Tier::InsufficientData),
            adjustment_rationale: state.adjustment_rationale.clone(),
        },
    ))
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_votes_leaves_score_unchanged() {
        assert_eq!(calibrate(80, &[], 30), 80);
    }

    #[test]
    fn adjustment_never_moves_score_up() {
        let calibrated = calibrate(80, &[-50], 30);
        assert!(calibrated <= 80);
    }

    #[test]
    fn average_adjustment_is_applied() {
        assert_eq!(calibrate(80, &[10, 20], 30), 65);
    }

    #[test]
    fn adjustment_is_bounded_by_max_downward_adjustment() {
        assert_eq!(calibrate(80, &[100], 30), 50);
    }
}
