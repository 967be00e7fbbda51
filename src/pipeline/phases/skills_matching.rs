//! P4 Skills Matching (spec.md §4.6): scores the profile against the
//! researched requirements. Direct lowercase matches are free; related-but-
//! not-identical skills go through a static transferability table first,
//! falling back to a single LLM judgement call for whatever remains
//! ambiguous. Owns `has_fundamental_mismatch`: true only when a CRITICAL
//! gap from P3 also corresponds to a requirement this phase left unmatched,
//! which clamps the final score.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::PromptLoader;
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::Phase;
use crate::pipeline::state::{Gap, PipelineState, QueryType, Severity};

/// Known adjacent-skill substitutions: if the employer wants the key and the
/// profile has one of the values, credit it as a transferable match without
/// an LLM call (spec.md §4.6).
static TRANSFERABILITY_RULES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("kubernetes", ["docker", "helm", "ecs"].as_slice()),
        ("grpc", ["rest api design", "protobuf", "thrift"].as_slice()),
        ("kafka", ["rabbitmq", "sqs", "pubsub"].as_slice()),
        ("postgresql", ["mysql", "sql", "sqlite"].as_slice()),
        ("react", ["next.js", "vue", "angular"].as_slice()),
        ("terraform", ["cloudformation", "pulumi", "ansible"].as_slice()),
        ("aws", ["gcp", "azure"].as_slice()),
    ])
});

#[derive(Debug, Deserialize)]
struct TransferabilityJudgement {
    #[serde(default)]
    transferable: Vec<String>,
}

/// Converts matched/unmatched counts into a 0-100 score, clamped to 35 on a
/// fundamental mismatch found in P3 (spec.md §4.6).
fn score_from_matches(matched: usize, unmatched: usize, has_fundamental_mismatch: bool) -> i32 {
    let total = matched + unmatched;
    let ratio = if total == 0 { 0.0 } else { matched as f64 / total as f64 };
    let mut score = (ratio * 100.0).round() as i32;
    if has_fundamental_mismatch {
        score = score.min(35);
    }
    score.clamp(0, 100)
}

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    ctx.emit(PipelineEvent::phase_start(Phase::SkillsMatching, 1)).await;

    let profile_skills: HashSet<String> = ctx.profile.all_skills_lowercased().into_iter().collect();

    // For a job-description query, P1's extracted_skills are the employer's
    // own phrasing of what they need and take priority over the researched
    // tech stack (spec.md §4.6).
    let mut required: Vec<String> = if matches!(state.query_type, Some(QueryType::JobDescription))
        && !state.extracted_skills.is_empty()
    {
        state.extracted_skills.iter().cloned().collect()
    } else {
        state.tech_stack.iter().map(|s| s.to_lowercase()).collect()
    };
    for requirement in &state.requirements {
        let lower = requirement.to_lowercase();
        if !required.iter().any(|r| lower.contains(r.as_str())) {
            required.push(lower);
        }
    }
    required.sort();
    required.dedup();

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    let mut ambiguous = Vec::new();

    for req in &required {
        if profile_skills.iter().any(|s| s == req || req.contains(s.as_str())) {
            matched.push(req.clone());
            continue;
        }
        let transferable = TRANSFERABILITY_RULES
            .get(req.as_str())
            .map(|alts| alts.iter().any(|alt| profile_skills.contains(*alt)))
            .unwrap_or(false);
        if transferable {
            matched.push(req.clone());
        } else {
            ambiguous.push(req.clone());
        }
    }

    if !ambiguous.is_empty() {
        if let Ok(system_prompt) = PromptLoader::load("skills_matching", state.model_class) {
            let mut params = HashMap::new();
            params.insert("profile_skills", profile_skills.iter().cloned().collect::<Vec<_>>().join(", "));
            params.insert("candidate_requirements", ambiguous.join(", "));
            let user_prompt = PromptLoader::render(&system_prompt, &params);

            if let Ok(judgement) = ctx
                .llm
                .complete_json::<TransferabilityJudgement>(state.model_class, &system_prompt, &user_prompt)
                .await
            {
                let transferable_set: HashSet<String> =
                    judgement.transferable.into_iter().map(|s| s.to_lowercase()).collect();
                for req in ambiguous {
                    if transferable_set.contains(&req) {
                        matched.push(req);
                    } else {
                        unmatched.push(req);
                    }
                }
            } else {
                unmatched.extend(ambiguous);
            }
        } else {
            unmatched.extend(ambiguous);
        }
    }

    let has_fundamental_mismatch = fundamental_mismatch(&state.gaps, &unmatched);
    let score = score_from_matches(matched.len(), unmatched.len(), has_fundamental_mismatch);

    state.matched = matched;
    state.unmatched = unmatched;
    state.match_score = Some(score);
    state.has_fundamental_mismatch = has_fundamental_mismatch;

    ctx.emit(PipelineEvent::phase_complete(
        Phase::SkillsMatching,
        PhaseCompleteData::SkillsMatching {
            match_score: score,
            matched_count: state.matched.len(),
            unmatched_count: state.unmatched.len(),
            has_fundamental_mismatch,
        },
    ))
    .await;

    Ok(())
}

/// `has_fundamental_mismatch` is owned by this phase (spec.md §3), not P3:
/// it fires only when a CRITICAL gap from P3 *also* corresponds to a
/// requirement this phase left unmatched (spec.md §4.6 point 4) -- a
/// CRITICAL gap whose requirement the profile actually covers (so it lands
/// in `matched` via a transferability rule or the judge) must not clamp the
/// score.
fn fundamental_mismatch(gaps: &[Gap], unmatched: &[String]) -> bool {
    gaps.iter().any(|gap| {
        gap.severity == Severity::Critical
            && unmatched.iter().any(|req| {
                let req = req.to_lowercase();
                let gap_req = gap.requirement.to_lowercase();
                req.contains(&gap_req) || gap_req.contains(&req)
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_scores_one_hundred() {
        assert_eq!(score_from_matches(5, 0, false), 100);
    }

    #[test]
    fn no_matches_scores_zero() {
        assert_eq!(score_from_matches(0, 0, false), 0);
        assert_eq!(score_from_matches(0, 5, false), 0);
    }

    #[test]
    fn partial_match_rounds_to_nearest_percent() {
        assert_eq!(score_from_matches(1, 2, false), 33);
        assert_eq!(score_from_matches(2, 1, false), 67);
    }

    #[test]
    fn fundamental_mismatch_clamps_to_thirty_five() {
        assert_eq!(score_from_matches(10, 0, true), 35);
        assert_eq!(score_from_matches(1, 9, true), 10);
    }

    #[test]
    fn kubernetes_transfers_to_docker() {
        let profile_skills: HashSet<String> = ["docker".to_string()].into_iter().collect();
        let transferable = TRANSFERABILITY_RULES
            .get("kubernetes")
            .map(|alts| alts.iter().any(|alt| profile_skills.contains(*alt)))
            .unwrap_or(false);
        assert!(transferable);
    }

    #[test]
    fn critical_gap_over_unmatched_requirement_is_a_fundamental_mismatch() {
        let gaps = vec![Gap { requirement: "ios development".to_string(), severity: Severity::Critical }];
        let unmatched = vec!["ios development".to_string()];
        assert!(fundamental_mismatch(&gaps, &unmatched));
    }

    #[test]
    fn critical_gap_over_a_matched_requirement_is_not_a_fundamental_mismatch() {
        // The profile actually covers the CRITICAL requirement (e.g. via a
        // transferability rule), so it never lands in `unmatched` -- spec.md
        // §4.6 point 4's conjunction must not fire here.
        let gaps = vec![Gap { requirement: "kubernetes".to_string(), severity: Severity::Critical }];
        let unmatched: Vec<String> = vec![];
        assert!(!fundamental_mismatch(&gaps, &unmatched));
    }

    #[test]
    fn non_critical_gap_is_never_a_fundamental_mismatch() {
        let gaps = vec![Gap { requirement: "graphql".to_string(), severity: Severity::High }];
        let unmatched = vec!["graphql".to_string()];
        assert!(!fundamental_mismatch(&gaps, &unmatched));
    }
}
