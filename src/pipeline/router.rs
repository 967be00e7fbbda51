//! The router: a pure function over state, the sole owner of
//! `search_attempt` (spec.md §4.9, §9 "loop termination witness").

use super::state::{
    CompanyVerifiability, PipelineState, QueryType, RecommendedAction, ResearchQualityTier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Connecting,
    DeepResearch,
    ResearchReranker,
    ContentEnrich,
    SkepticalComparison,
    SkillsMatching,
    ConfidenceReranker,
    GenerateResults,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::DeepResearch => "deep_research",
            Self::ResearchReranker => "research_reranker",
            Self::ContentEnrich => "content_enrich",
            Self::SkepticalComparison => "skeptical_comparison",
            Self::SkillsMatching => "skills_matching",
            Self::ConfidenceReranker => "confidence_reranker",
            Self::GenerateResults => "generate_results",
        }
    }
}

pub enum Next {
    Phase(Phase),
    End,
}

/// `max_search_attempts` is threaded in from config rather than hardcoded,
/// but defaults to the spec's MAX_SEARCH_ATTEMPTS = 2.
pub fn route_after_connecting(state: &PipelineState) -> Next {
    match state.query_type {
        Some(qt) if qt.is_terminal_refusal() => Next::Phase(Phase::GenerateResults),
        Some(_) => Next::Phase(Phase::DeepResearch),
        None => Next::Phase(Phase::GenerateResults),
    }
}

pub fn route_after_deep_research(_state: &PipelineState) -> Next {
    Next::Phase(Phase::ResearchReranker)
}

/// Implements the routing table in spec.md §4.3. The router -- and only the
/// router -- increments `search_attempt` on the ENHANCE_SEARCH edge; this
/// function takes `state` by value logically but the caller is responsible
/// for actually mutating `search_attempt` on the returned `RouteDecision`,
/// keeping the pure-function/side-effect split explicit at the call site.
pub struct RouteDecision {
    pub next: Next,
    pub increment_search_attempt: bool,
}

pub fn route_after_research_reranker(state: &PipelineState, max_attempts: u32) -> RouteDecision {
    let at_max = state.search_attempt >= max_attempts;
    let suspicious =
        state.company_verifiability == Some(CompanyVerifiability::Suspicious);
    let tier = state.research_quality_tier.unwrap_or(ResearchQualityTier::Insufficient);

    if suspicious {
        return RouteDecision {
            next: Next::Phase(Phase::GenerateResults),
            increment_search_attempt: false,
        };
    }

    match tier {
        ResearchQualityTier::High | ResearchQualityTier::Medium => RouteDecision {
            next: Next::Phase(Phase::ContentEnrich),
            increment_search_attempt: false,
        },
        ResearchQualityTier::Low | ResearchQualityTier::Insufficient => {
            if at_max {
                RouteDecision {
                    next: Next::Phase(Phase::GenerateResults),
                    increment_search_attempt: false,
                }
            } else {
                RouteDecision {
                    next: Next::Phase(Phase::DeepResearch),
                    increment_search_attempt: true,
                }
            }
        },
    }
}

/// The `recommended_action` field on state (set by P2b) must agree with
/// this routing decision; phases upstream of the router read it only for
/// display/flagging purposes, never to make their own routing choice.
pub fn recommended_action_for(decision: &RouteDecision, state: &PipelineState) -> RecommendedAction {
    if state.company_verifiability == Some(CompanyVerifiability::Suspicious) {
        return RecommendedAction::FlagLowData;
    }
    match decision.next {
        Next::Phase(Phase::ContentEnrich) => RecommendedAction::Continue,
        Next::Phase(Phase::DeepResearch) => RecommendedAction::EnhanceSearch,
        _ => RecommendedAction::FlagLowData,
    }
}

pub fn route_after_content_enrich(_state: &PipelineState) -> Next {
    Next::Phase(Phase::SkepticalComparison)
}

pub fn route_after_skeptical_comparison(_state: &PipelineState) -> Next {
    Next::Phase(Phase::SkillsMatching)
}

pub fn route_after_skills_matching(_state: &PipelineState) -> Next {
    Next::Phase(Phase::ConfidenceReranker)
}

pub fn route_after_confidence_reranker(_state: &PipelineState) -> Next {
    Next::Phase(Phase::GenerateResults)
}

pub fn route_after_generate_results(_state: &PipelineState) -> Next {
    Next::End
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::ModelClass;

    fn base_state() -> PipelineState {
        PipelineState::new("test query".to_string(), ModelClass::Standard, false)
    }

    #[test]
    fn adversarial_query_short_circuits_to_generate_results() {
        let mut state = base_state();
        state.query_type = Some(QueryType::Adversarial);
        match route_after_connecting(&state) {
            Next::Phase(Phase::GenerateResults) => {},
            _ => panic!("expected short-circuit to GenerateResults"),
        }
    }

    #[test]
    fn company_query_proceeds_to_deep_research() {
        let mut state = base_state();
        state.query_type = Some(QueryType::Company);
        match route_after_connecting(&state) {
            Next::Phase(Phase::DeepResearch) => {},
            _ => panic!("expected DeepResearch"),
        }
    }

    #[test]
    fn low_tier_under_max_attempts_enhances_search_and_increments_counter() {
        let mut state = base_state();
        state.research_quality_tier = Some(ResearchQualityTier::Low);
        state.search_attempt = 1;
        let decision = route_after_research_reranker(&state, 2);
        assert!(decision.increment_search_attempt);
        match decision.next {
            Next::Phase(Phase::DeepResearch) => {},
            _ => panic!("expected DeepResearch"),
        }
    }

    #[test]
    fn low_tier_at_max_attempts_flags_low_data_without_incrementing() {
        let mut state = base_state();
        state.research_quality_tier = Some(ResearchQualityTier::Low);
        state.search_attempt = 2;
        let decision = route_after_research_reranker(&state, 2);
        assert!(!decision.increment_search_attempt);
        match decision.next {
            Next::Phase(Phase::GenerateResults) => {},
            _ => panic!("expected GenerateResults"),
        }
    }

    #[test]
    fn suspicious_verifiability_always_flags_low_data() {
        let mut state = base_state();
        state.research_quality_tier = Some(ResearchQualityTier::High);
        state.company_verifiability = Some(CompanyVerifiability::Suspicious);
        let decision = route_after_research_reranker(&state, 2);
        assert!(!decision.increment_search_attempt);
        match decision.next {
            Next::Phase(Phase::GenerateResults) => {},
            _ => panic!("expected GenerateResults"),
        }
    }

    #[test]
    fn search_attempt_is_bounded_across_random_tiers() {
        // Property test per spec.md §9: 1000 random (tier, attempt) pairs
        // must never push search_attempt past max_attempts.
        let tiers = [
            ResearchQualityTier::High,
            ResearchQualityTier::Medium,
            ResearchQualityTier::Low,
            ResearchQualityTier::Insufficient,
        ];
        let max_attempts = 2;
        let mut seed = 0x2545F4914F6CDD1Du64;
        for _ in 0..1000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let tier = tiers[(seed >> 33) as usize % tiers.len()];
            let attempt = (seed >> 16) as u32 % 5;

            let mut state = base_state();
            state.research_quality_tier = Some(tier);
            state.search_attempt = attempt;
            let decision = route_after_research_reranker(&state, max_attempts);

            let next_attempt =
                if decision.increment_search_attempt { attempt + 1 } else { attempt };
            assert!(next_attempt <= max_attempts, "search_attempt exceeded bound: {next_attempt}");
        }
    }
}
