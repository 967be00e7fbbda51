//! P5 Generate Results (spec.md §4.8): the only phase that streams tokens
//! to the client as they are produced. Picks one of three prompt branches --
//! refusal, low-data, or full report -- and accumulates the streamed text
//! into `final_report`.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::llm::PromptLoader;
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::Phase;
use crate::pipeline::state::{PipelineState, Tier};

fn select_template(state: &PipelineState) -> &'static str {
    if matches!(state.query_type, Some(qt) if qt.is_terminal_refusal()) {
        return "refusal";
    }
    if matches!(state.tier, Some(Tier::InsufficientData)) || state.tier.is_none() {
        return "generate_results_low_data";
    }
    "generate_results"
}

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    ctx.emit(PipelineEvent::phase_start(Phase::GenerateResults, 1)).await;

    let template_name = select_template(state);
    let system_prompt = PromptLoader::load(template_name, state.model_class)
        .map_err(|e| PipelineError::Agent(e.to_string()))?;

    let mut params = HashMap::new();
    params.insert("query", state.query.clone());
    params.insert("employer_summary", state.employer_summary.clone());
    params.insert(
        "strengths",
        state.strengths.iter().map(|s| format!("- {} ({})", s.claim, s.evidence)).collect::<Vec<_>>().join("\n"),
    );
    params.insert(
        "gaps",
        state.gaps.iter().map(|g| format!("- {} [{:?}]", g.requirement, g.severity)).collect::<Vec<_>>().join("\n"),
    );
    params.insert("matched", state.matched.join(", "));
    params.insert("unmatched", state.unmatched.join(", "));
    params.insert("match_score", state.match_score.map(|s| s.to_string()).unwrap_or_default());
    params.insert(
        "calibrated_score",
        state.calibrated_score.map(|s| s.to_string()).unwrap_or_default(),
    );
    params.insert("tier", state.tier.map(|t| format!("{t:?}")).unwrap_or_default());
    params.insert("adjustment_rationale", state.adjustment_rationale.clone());
    params.insert("has_fundamental_mismatch", state.has_fundamental_mismatch.to_string());
    let user_prompt = PromptLoader::render(&system_prompt, &params);

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let llm = ctx.llm.clone();
    let model_class = state.model_class;
    let system_prompt_owned = system_prompt.clone();
    let user_prompt_owned = user_prompt.clone();

    let stream_handle = tokio::spawn(async move {
        llm.stream_completion(model_class, &system_prompt_owned, &user_prompt_owned, tx).await
    });

    let mut report = String::new();
    while let Some(chunk) = rx.recv().await {
        report.push_str(&chunk);
        ctx.emit(PipelineEvent::Response { text: chunk }).await;
    }

    // If the stream errored before producing anything, fall back to a
    // single non-streamed call rather than emitting an empty report.
    let stream_result = stream_handle.await.map_err(|e| PipelineError::Agent(e.to_string()))?;
    if report.is_empty() {
        if let Err(err) = stream_result {
            report = ctx.llm.complete_text(state.model_class, &system_prompt, &user_prompt, false).await.map_err(
                |_| PipelineError::Llm(err.to_string()),
            )?;
            ctx.emit(PipelineEvent::Response { text: report.clone() }).await;
        }
    }

    state.final_report = report;

    ctx.emit(PipelineEvent::phase_complete(
        Phase::GenerateResults,
        PhaseCompleteData::GenerateResults { report_chars: state.final_report.chars().count() },
    ))
    .await;

    Ok(())
}
