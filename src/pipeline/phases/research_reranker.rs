//! P2b Research Reranker (spec.md §4.3): the quality gate that decides
//! whether P2's findings are good enough to proceed on, need another search
//! attempt, or should be flagged and passed through with low data. Runs a
//! panel of M ≤ 4 LLM judges over independent rubric dimensions and
//! combines their scores; this is the one phase with a weighted rubric
//! instead of a single LLM call.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::{LlmHandle, ParallelScorer, PromptLoader};
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::{self, Phase};
use crate::pipeline::state::{CompanyVerifiability, PipelineState, QualityFlag, ResearchQualityTier};

#[derive(Debug, Clone, Copy)]
struct RubricDimension {
    key: &'static str,
    weight: f64,
}

/// The five weighted rubric dimensions named in spec.md §4.3, summing to
/// 1.0.
const RUBRIC: &[RubricDimension] = &[
    RubricDimension { key: "tech_stack_quality", weight: 0.30 },
    RubricDimension { key: "requirements_specificity", weight: 0.25 },
    RubricDimension { key: "company_verifiability", weight: 0.25 },
    RubricDimension { key: "data_freshness", weight: 0.10 },
    RubricDimension { key: "source_diversity", weight: 0.10 },
];

#[derive(Debug, Deserialize)]
struct DimensionJudgement {
    score: i32,
    #[serde(default)]
    verifiability: Option<CompanyVerifiability>,
}

async fn judge_dimension(
    llm: &LlmHandle,
    model_class: crate::pipeline::state::ModelClass,
    dimension: RubricDimension,
    state: &PipelineState,
) -> Option<DimensionJudgement> {
    let system_prompt =
        PromptLoader::load("research_reranker", model_class).ok()?;
    let mut params = HashMap::new();
    params.insert("dimension", dimension.key.to_string());
    params.insert("employer_summary", state.employer_summary.clone());
    params.insert("tech_stack", state.tech_stack.join(", "));
    params.insert("requirements", state.requirements.join("; "));
    params.insert("source_count", state.raw_search_results.len().to_string());
    let user_prompt = PromptLoader::render(&system_prompt, &params);

    llm.complete_json(model_class, &system_prompt, &user_prompt).await.ok()
}

/// Maps a weighted confidence score onto the research-quality tier table
/// (spec.md §4.3).
fn tier_from_confidence(score: i32) -> ResearchQualityTier {
    match score {
        80..=i32::MAX => ResearchQualityTier::High,
        55..=79 => ResearchQualityTier::Medium,
        30..=54 => ResearchQualityTier::Low,
        _ => ResearchQualityTier::Insufficient,
    }
}

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    ctx.emit(PipelineEvent::phase_start(Phase::ResearchReranker, state.search_attempt + 1)).await;

    let scorer = ParallelScorer::new(ctx.config.pipeline.judge_concurrency);
    let llm = ctx.llm.clone();
    let model_class = state.model_class;
    let snapshot = state.clone();

    let jobs: Vec<_> = RUBRIC
        .iter()
        .copied()
        .map(|dimension| {
            let llm = llm.clone();
            let snapshot = snapshot.clone();
            move || async move { (dimension, judge_dimension(&llm, model_class, dimension, &snapshot).await) }
        })
        .collect();

    let judged = scorer.run(jobs, ctx.cancel_rx.clone()).await;

    let mut weighted_sum = 0.0;
    let mut weight_seen = 0.0;
    let mut verifiability_votes: HashMap<CompanyVerifiability, u32> = HashMap::new();
    for result in judged.into_iter().flatten() {
        let (dimension, judgement) = result;
        if let Some(judgement) = judgement {
            weighted_sum += judgement.score as f64 * dimension.weight;
            weight_seen += dimension.weight;
            if let Some(v) = judgement.verifiability {
                *verifiability_votes.entry(v).or_insert(0) += 1;
            }
        }
    }

    let confidence_score =
        if weight_seen > 0.0 { (weighted_sum / weight_seen).round() as i32 } else { 0 };
    let confidence_score = confidence_score.clamp(0, 100);
    state.data_confidence_score = Some(confidence_score);
    state.research_quality_tier = Some(tier_from_confidence(confidence_score));

    state.company_verifiability = verifiability_votes
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(v, _)| v)
        .or(Some(CompanyVerifiability::Unverified));

    // P2c takes its top-K URLs straight off the front of `raw_search_results`
    // (spec.md §4.4: "ranked by P2b"); this is the one ranking step, sorting
    // by the search provider's own relevance score, highest first, with
    // unscored hits pushed to the back rather than sorted arbitrarily.
    state.raw_search_results.sort_by(|a, b| {
        b.score.unwrap_or(f64::MIN).partial_cmp(&a.score.unwrap_or(f64::MIN)).unwrap_or(std::cmp::Ordering::Equal)
    });

    if state.tech_stack.len() < 3 {
        state.add_quality_flag(QualityFlag::SparseTechStack);
    }
    if state.requirements.is_empty() {
        state.add_quality_flag(QualityFlag::NoRequirements);
    }
    if state.raw_search_results.len() <= 1 {
        state.add_quality_flag(QualityFlag::SingleSource);
    }
    if state.company_verifiability == Some(CompanyVerifiability::Unverified)
        || state.company_verifiability == Some(CompanyVerifiability::Suspicious)
    {
        state.add_quality_flag(QualityFlag::UnverifiedCompany);
    }

    // Enhancement queries are only useful if another attempt will actually
    // happen; the router decides that, this phase just prepares candidates.
    if matches!(
        state.research_quality_tier,
        Some(ResearchQualityTier::Low) | Some(ResearchQualityTier::Insufficient)
    ) {
        let subject = state.company_name.clone().or_else(|| state.job_title.clone()).unwrap_or_default();
        state.enhancement_queries = vec![
            format!("{subject} glassdoor engineering reviews"),
            format!("{subject} github engineering blog"),
            format!("{subject} tech stack 2026"),
        ]
        .into_iter()
        .take(ctx.config.pipeline.max_enhancement_queries)
        .collect();
    }

    let tier = state.research_quality_tier.unwrap_or(ResearchQualityTier::Insufficient);
    let verifiability = state.company_verifiability.unwrap_or(CompanyVerifiability::Unverified);

    // `recommended_action` itself is decided by the router, not this phase;
    // re-run the same pure function here purely to report the decision the
    // engine is about to make, rather than recomputing the logic by hand and
    // risking it drifting out of sync with the router's own table.
    let decision = router::route_after_research_reranker(state, ctx.config.pipeline.max_search_attempts);
    let recommended_action = router::recommended_action_for(&decision, state);

    ctx.emit(PipelineEvent::phase_complete(
        Phase::ResearchReranker,
        PhaseCompleteData::ResearchReranker {
            data_quality_tier: tier,
            research_quality_tier: tier,
            confidence_score,
            recommended_action,
            company_verifiability: verifiability,
        },
    ))
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rubric_weights_sum_to_one() {
        let total: f64 = RUBRIC.iter().map(|d| d.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tier_boundaries_match_spec_table() {
        assert_eq!(tier_from_confidence(100), ResearchQualityTier::High);
        assert_eq!(tier_from_confidence(80), ResearchQualityTier::High);
        assert_eq!(tier_from_confidence(79), ResearchQualityTier::Medium);
        assert_eq!(tier_from_confidence(55), ResearchQualityTier::Medium);
        assert_eq!(tier_from_confidence(54), ResearchQualityTier::Low);
        assert_eq!(tier_from_confidence(30), ResearchQualityTier::Low);
        assert_eq!(tier_from_confidence(29), ResearchQualityTier::Insufficient);
        assert_eq!(tier_from_confidence(0), ResearchQualityTier::Insufficient);
    }
}
