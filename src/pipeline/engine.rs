//! The orchestrator: runs phases in the order the router dictates, owns the
//! whole-pipeline timeout and the cancellation signal (spec.md §5). Runs
//! single-threaded/cooperatively -- one `PipelineState` per request, never
//! shared, never mutated concurrently by more than one phase at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::PipelineError;
use crate::fetch::ContentFetcher;
use crate::llm::LlmHandle;
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PipelineEvent, RunStatus};
use crate::pipeline::phases;
use crate::pipeline::router::{self, Next, Phase};
use crate::pipeline::state::{ModelClass, PipelineState, Tier};
use crate::profile::EngineerProfile;
use crate::search::SearchClient;

#[derive(Clone)]
pub struct PipelineEngine {
    pub llm: LlmHandle,
    pub search: Arc<dyn SearchClient>,
    pub fetcher: Arc<ContentFetcher>,
    pub profile: Arc<EngineerProfile>,
    pub config: Arc<Config>,
}

impl PipelineEngine {
    pub fn new(
        llm: LlmHandle,
        search: Arc<dyn SearchClient>,
        fetcher: Arc<ContentFetcher>,
        profile: Arc<EngineerProfile>,
        config: Arc<Config>,
    ) -> Self {
        Self { llm, search, fetcher, profile, config }
    }

    /// Drives one request end to end, emitting SSE events on `events_tx`
    /// until a terminal `Complete` or `Error` event is sent. Disconnection
    /// is detected implicitly: once the handler drops its receiver, sends
    /// on `events_tx` start failing and `PhaseContext::is_cancelled` flips.
    pub async fn run(
        &self,
        query: String,
        model_class: ModelClass,
        include_thoughts: bool,
        events_tx: mpsc::Sender<PipelineEvent>,
    ) {
        let ctx = PhaseContext::new(
            self.llm.clone(),
            Arc::clone(&self.search),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.profile),
            Arc::clone(&self.config),
            events_tx.clone(),
            include_thoughts,
        );

        ctx.emit(PipelineEvent::Status {
            status: RunStatus::Connecting,
            message: "connecting".to_string(),
        })
        .await;

        let start = Instant::now();
        let mut state = PipelineState::new(query, model_class, include_thoughts);
        let timeout = Duration::from_secs(ctx.config.pipeline.whole_pipeline_timeout_secs);

        match tokio::time::timeout(timeout, Self::drive(&ctx, &mut state)).await {
            Ok(Ok(())) => {
                ctx.emit(PipelineEvent::Complete {
                    duration_ms: start.elapsed().as_millis() as u64,
                    final_status: final_status(&state),
                })
                .await;
            },
            Ok(Err(err)) => {
                ctx.emit(PipelineEvent::Error { code: err.code(), message: err.to_string() }).await;
            },
            Err(_) => {
                // Whole-pipeline timeout breach (spec.md §5): jump straight
                // to a minimal apology using whatever partial data exists.
                state.error = Some("whole-pipeline timeout exceeded".to_string());
                if phases::generate_results::run(&mut state, &ctx).await.is_ok() {
                    ctx.emit(PipelineEvent::Complete {
                        duration_ms: start.elapsed().as_millis() as u64,
                        final_status: "timeout_partial",
                    })
                    .await;
                } else {
                    ctx.emit(PipelineEvent::Error {
                        code: "TIMEOUT",
                        message: "whole-pipeline timeout exceeded".to_string(),
                    })
                    .await;
                }
            },
        }
    }

    async fn drive(ctx: &PhaseContext, state: &mut PipelineState) -> Result<(), PipelineError> {
        let mut current = Phase::Connecting;

        loop {
            if ctx.is_cancelled() {
                return Err(PipelineError::Agent("client disconnected".to_string()));
            }

            if current != Phase::Connecting {
                ctx.emit(PipelineEvent::Status {
                    status: RunStatus::for_phase(current),
                    message: current.as_str().to_string(),
                })
                .await;
            }

            let next = match current {
                Phase::Connecting => {
                    phases::connecting::run(state, ctx).await?;
                    router::route_after_connecting(state)
                },
                Phase::DeepResearch => {
                    phases::deep_research::run(state, ctx).await?;
                    router::route_after_deep_research(state)
                },
                Phase::ResearchReranker => {
                    phases::research_reranker::run(state, ctx).await?;
                    let decision = router::route_after_research_reranker(
                        state,
                        ctx.config.pipeline.max_search_attempts,
                    );
                    state.recommended_action =
                        Some(router::recommended_action_for(&decision, state));
                    if decision.increment_search_attempt {
                        state.search_attempt += 1;
                    }
                    // The FLAG_LOW_DATA edge jumps straight to GenerateResults,
                    // bypassing ConfidenceReranker -- the only other phase
                    // that writes `tier`. Set it here so every `complete`
                    // event still carries a valid tier (spec.md §3 invariant
                    // 3, §8 seed scenario 5).
                    if matches!(decision.next, Next::Phase(Phase::GenerateResults)) {
                        state.tier = Some(Tier::InsufficientData);
                    }
                    decision.next
                },
                Phase::ContentEnrich => {
                    phases::content_enrich::run(state, ctx).await?;
                    router::route_after_content_enrich(state)
                },
                Phase::SkepticalComparison => {
                    phases::skeptical_comparison::run(state, ctx).await?;
                    router::route_after_skeptical_comparison(state)
                },
                Phase::SkillsMatching => {
                    phases::skills_matching::run(state, ctx).await?;
                    router::route_after_skills_matching(state)
                },
                Phase::ConfidenceReranker => {
                    phases::confidence_reranker::run(state, ctx).await?;
                    enforce_tier_consistency(state);
                    router::route_after_confidence_reranker(state)
                },
                Phase::GenerateResults => {
                    phases::generate_results::run(state, ctx).await?;
                    router::route_after_generate_results(state)
                },
            };

            match next {
                Next::Phase(phase) => current = phase,
                Next::End => return Ok(()),
            }
        }
    }
}

/// Classifies a completed run for the terminal `complete` event (spec.md
/// §6 `final_status`).
fn final_status(state: &PipelineState) -> &'static str {
    if state.query_type.map(|qt| qt.is_terminal_refusal()).unwrap_or(false) {
        "refused"
    } else if matches!(state.tier, None | Some(Tier::InsufficientData)) {
        "insufficient_data"
    } else {
        "completed"
    }
}

/// Coerces a tier/score mismatch rather than letting an inconsistent pair
/// reach the client (spec.md §7 taxonomy kind 5: "invariant violation").
fn enforce_tier_consistency(state: &mut PipelineState) {
    if let (Some(tier), score) = (state.tier, state.calibrated_score)
        && !tier.is_consistent_with(score)
    {
        state.tier = score.map(crate::pipeline::state::Tier::from_score);
    }
}
