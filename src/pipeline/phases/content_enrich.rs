//! P2c Content Enrich (spec.md §4.4): fetches the top K ≤ 5 search hits
//! concurrently for deeper source text. Never fails the pipeline -- every
//! fetch failure just means one fewer enriched source.

use crate::error::PipelineError;
use crate::pipeline::context::PhaseContext;
use crate::pipeline::events::{PhaseCompleteData, PipelineEvent};
use crate::pipeline::router::Phase;
use crate::pipeline::state::{EnrichedSourceRef, PipelineState, QualityFlag};

pub async fn run(state: &mut PipelineState, ctx: &PhaseContext) -> Result<(), PipelineError> {
    ctx.emit(PipelineEvent::phase_start(Phase::ContentEnrich, 1)).await;

    // `raw_search_results` is already sorted by P2b's relevance ranking
    // (spec.md §4.4: "top-K ... ranked by P2b"); this phase just takes the
    // front slice, it never reorders.
    let top_k = ctx.config.fetch.max_concurrent_fetches;
    let urls: Vec<String> = state
        .raw_search_results
        .iter()
        .take(top_k)
        .map(|hit| hit.url.clone())
        .collect();

    let mut set = tokio::task::JoinSet::new();
    for url in urls {
        let fetcher = ctx.fetcher.clone();
        ctx.emit_tool_call("http_fetch", serde_json::json!({ "url": url })).await;
        set.spawn(async move {
            let result = fetcher.fetch_one(&url).await;
            (url, result)
        });
    }

    let mut fetched = 0usize;
    let mut attempted = 0usize;
    let mut cancel = ctx.cancel_rx.clone();
    loop {
        if *cancel.borrow() {
            set.abort_all();
            break;
        }
        tokio::select! {
            joined = set.join_next() => {
                let Some(joined) = joined else { break };
                attempted += 1;
                if let Ok((url, Some(source))) = joined {
                    fetched += 1;
                    ctx.emit_observation("http_fetch", format!("fetched {} ({} KB)", url, source.kb_size)).await;
                    state.enriched_sources.push(EnrichedSourceRef {
                        url: source.url,
                        extracted_text: source.extracted_text,
                        kb_size: source.kb_size,
                    });
                } else if let Ok((url, None)) = joined {
                    ctx.emit_observation("http_fetch", format!("fetch failed for {url}")).await;
                }
            },
            _ = cancel.changed() => {},
        }
    }

    if attempted > 0 && fetched == 0 {
        state.add_quality_flag(QualityFlag::SearchFailed);
    }

    ctx.emit(PipelineEvent::phase_complete(
        Phase::ContentEnrich,
        PhaseCompleteData::ContentEnrich { enriched_count: fetched, attempted_count: attempted },
    ))
    .await;

    Ok(())
}
