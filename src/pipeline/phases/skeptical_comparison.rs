//! P3 Skeptical Comparison (spec.md §4.5): compares the profile against the
//! researched requirements with an anti-sycophancy mandate -- at least two
//! gaps must survive, and every strength must carry supporting evidence.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::PromptLoader;
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::Phase;
use crate::pipeline::state::{Gap, PipelineState, QualityFlag, RiskLevel, Severity, Strength};

#[derive(Debug, Deserialize)]
struct ComparisonOutput {
    #[serde(default)]
    strengths: Vec<Strength>,
    #[serde(default)]
    gaps: Vec<Gap>,
    #[serde(default = "default_risk")]
    risk_assessment: RiskLevel,
}

fn default_risk() -> RiskLevel {
    RiskLevel::Medium
}

/// Anti-sycophancy floor: at least two gaps must survive even if the judge
/// under-reported them. Missing slots are filled conservatively from
/// unmatched requirements rather than fabricated critical gaps (spec.md
/// §4.5).
fn fill_gap_floor(gaps: &mut Vec<Gap>, requirements: &[String]) {
    if gaps.len() >= 2 {
        return;
    }
    for requirement in requirements {
        if gaps.len() >= 2 {
            break;
        }
        if !gaps.iter().any(|g| g.requirement == *requirement) {
            gaps.push(Gap { requirement: requirement.clone(), severity: Severity::Medium });
        }
    }
}

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    ctx.emit(PipelineEvent::phase_start(Phase::SkepticalComparison, 1)).await;

    let system_prompt = PromptLoader::load("skeptical_comparison", state.model_class)
        .map_err(|e| PipelineError::Agent(e.to_string()))?;
    let mut params = HashMap::new();
    params.insert("employer_summary", state.employer_summary.clone());
    params.insert("requirements", state.requirements.join("; "));
    params.insert("tech_stack", state.tech_stack.join(", "));
    params.insert("profile_skills", ctx.profile.all_skills_lowercased().join(", "));
    params.insert(
        "profile_experience",
        ctx.profile
            .experience
            .iter()
            .map(|e| format!("{} at {} ({})", e.title, e.company, e.years))
            .collect::<Vec<_>>()
            .join("; "),
    );
    let user_prompt = PromptLoader::render(&system_prompt, &params);

    // An LLM failure here is an external-dependency failure, not a fatal
    // agent error (spec.md §7 kind 3) -- degrade to an empty comparison and
    // flag it, same as `skills_matching` does on its own judge call, rather
    // than aborting the whole run via `?`. `fill_gap_floor` below still
    // backstops the anti-sycophancy gap minimum from `state.requirements`.
    let mut output: ComparisonOutput = match ctx
        .llm
        .complete_json(state.model_class, &system_prompt, &user_prompt)
        .await
    {
        Ok(output) => output,
        Err(_) => {
            state.add_quality_flag(QualityFlag::HallucinationRisk);
            ComparisonOutput { strengths: Vec::new(), gaps: Vec::new(), risk_assessment: default_risk() }
        },
    };

    // Evidence rule: a strength with no supporting evidence text is dropped
    // rather than trusted (spec.md §4.5 anti-sycophancy guardrail).
    output.strengths.retain(|s| !s.evidence.trim().is_empty());

    fill_gap_floor(&mut output.gaps, &state.requirements);

    // A CRITICAL severity marks a candidate domain mismatch (spec.md §4.5),
    // but `has_fundamental_mismatch` itself is P4's field, not this phase's
    // (spec.md §3 data-model table) -- P4 is the one that knows whether the
    // CRITICAL requirement actually went unmatched, which is the spec's
    // stricter conjunction condition (§4.6 point 4), not "any CRITICAL gap
    // exists" alone.
    state.strengths = output.strengths;
    state.gaps = output.gaps;
    state.risk_assessment = Some(output.risk_assessment);

    ctx.emit(PipelineEvent::phase_complete(
        Phase::SkepticalComparison,
        PhaseCompleteData::SkepticalComparison {
            strengths_count: state.strengths.len(),
            gaps_count: state.gaps.len(),
            risk_assessment: output.risk_assessment,
        },
    ))
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_fills_up_to_two_gaps_from_requirements() {
        let mut gaps = vec![];
        let requirements = vec!["rust".to_string(), "kubernetes".to_string(), "graphql".to_string()];
        fill_gap_floor(&mut gaps, &requirements);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].requirement, "rust");
        assert_eq!(gaps[1].requirement, "kubernetes");
    }

    #[test]
    fn floor_leaves_existing_gaps_past_the_minimum_untouched() {
        let mut gaps = vec![
            Gap { requirement: "rust".to_string(), severity: Severity::Critical },
            Gap { requirement: "kubernetes".to_string(), severity: Severity::High },
            Gap { requirement: "graphql".to_string(), severity: Severity::Low },
        ];
        let requirements = vec!["rust".to_string()];
        fill_gap_floor(&mut gaps, &requirements);
        assert_eq!(gaps.len(), 3);
    }

    #[test]
    fn floor_does_not_duplicate_an_already_reported_gap() {
        let mut gaps = vec![Gap { requirement: "rust".to_string(), severity: Severity::Low }];
        let requirements = vec!["rust".to_string(), "kubernetes".to_string()];
        fill_gap_floor(&mut gaps, &requirements);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[1].requirement, "kubernetes");
    }
}
