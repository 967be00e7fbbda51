//! P2 Deep Research (spec.md §4.2): fans out up to N ≤ 5 search queries,
//! synthesises an employer summary, and falls back to industry-inferred
//! tech-stack defaults when the search results are too sparse to name one.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::PromptLoader;
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::Phase;
use crate::pipeline::state::{PipelineState, QualityFlag, QueryType};
use crate::search::industry::detect_industry;
use crate::search::industry::INDUSTRY_TECH_DEFAULTS;

#[derive(Debug, Deserialize)]
struct SynthesisOutput {
    #[serde(default)]
    employer_summary: String,
    #[serde(default)]
    tech_stack: Vec<String>,
    #[serde(default)]
    requirements: Vec<String>,
    #[serde(default)]
    culture_signals: Vec<String>,
}

fn build_queries(state: &PipelineState, max_concurrent: usize) -> Vec<String> {
    // On an enhancement loop re-entry, P2b's enhancement_queries take over
    // entirely; attempt 1 builds generic queries off the extracted entities.
    if state.search_attempt > 0 && !state.enhancement_queries.is_empty() {
        return state.enhancement_queries.iter().take(max_concurrent).cloned().collect();
    }

    let subject = state
        .company_name
        .clone()
        .or_else(|| state.job_title.clone())
        .unwrap_or_else(|| state.query.clone());

    let mut queries = vec![
        format!("{subject} company overview"),
        format!("{subject} engineering tech stack"),
        format!("{subject} job requirements"),
    ];
    if matches!(state.query_type, Some(QueryType::JobDescription)) {
        queries.push(format!("{subject} interview process"));
    } else {
        queries.push(format!("{subject} engineering culture"));
    }
    queries.truncate(max_concurrent);
    queries
}

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    let attempt = state.search_attempt + 1;
    ctx.emit(PipelineEvent::phase_start(Phase::DeepResearch, attempt)).await;

    let queries = build_queries(state, ctx.config.search.max_concurrent_queries);
    ctx.emit_tool_call("web_search", serde_json::json!({ "queries": queries })).await;
    let results = ctx.search.search_batch(&queries, ctx.cancel_rx.clone()).await;

    let mut hits = Vec::new();
    let mut any_failed = false;
    for result in &results {
        match result {
            Ok(batch) => hits.extend(batch.clone()),
            Err(_) => any_failed = true,
        }
    }
    if any_failed {
        state.add_quality_flag(QualityFlag::SearchFailed);
    }
    ctx.emit_observation(
        "web_search",
        format!("{} hits across {} queries, {} failed", hits.len(), results.len(), results.iter().filter(|r| r.is_err()).count()),
    )
    .await;

    // Dedup by URL, preserving first-seen order (spec.md §4.2).
    let mut seen = std::collections::HashSet::new();
    hits.retain(|hit| seen.insert(hit.url.clone()));
    state.raw_search_results.extend(hits.clone());

    let system_prompt = PromptLoader::load("deep_research", state.model_class)
        .map_err(|e| PipelineError::Agent(e.to_string()))?;
    let mut params = HashMap::new();
    params.insert("query", state.query.clone());
    params.insert(
        "search_results",
        hits.iter()
            .map(|h| format!("- {} ({}): {}", h.title, h.url, h.snippet))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    let user_prompt = PromptLoader::render(&system_prompt, &params);

    let synthesis: SynthesisOutput = ctx
        .llm
        .complete_json(state.model_class, &system_prompt, &user_prompt)
        .await
        .unwrap_or_else(|_| SynthesisOutput {
            employer_summary: String::new(),
            tech_stack: Vec::new(),
            requirements: Vec::new(),
            culture_signals: Vec::new(),
        });

    state.employer_summary = synthesis.employer_summary;
    state.tech_stack = synthesis.tech_stack;
    state.requirements = synthesis.requirements;
    state.culture_signals = synthesis.culture_signals;

    // Sparse tech-stack fallback: infer from keywords across the summary and
    // requirements text, then use the named-industry default list.
    if state.tech_stack.len() < 3 {
        let haystack = format!(
            "{} {} {}",
            state.employer_summary,
            state.requirements.join(" "),
            state.query
        );
        if let Some(industry) = detect_industry(&haystack)
            && let Some(defaults) = INDUSTRY_TECH_DEFAULTS.get(industry)
        {
            state.add_quality_flag(QualityFlag::InferredIndustry);
            for tech in defaults.iter() {
                if !state.tech_stack.iter().any(|t| t.eq_ignore_ascii_case(tech)) {
                    state.tech_stack.push(tech.to_string());
                }
            }
        }
    }

    ctx.emit(PipelineEvent::phase_complete(
        Phase::DeepResearch,
        PhaseCompleteData::DeepResearch {
            search_attempt: attempt,
            tech_stack_count: state.tech_stack.len(),
            requirements_count: state.requirements.len(),
            source_count: state.raw_search_results.len(),
        },
    ))
    .await;

    Ok(())
}
