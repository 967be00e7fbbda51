//! Shared, read-only handles every phase needs. Built once per request by
//! the engine and passed by reference into each phase function.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::fetch::ContentFetcher;
use crate::llm::LlmHandle;
use crate::pipeline::events::{PipelineEvent, ThoughtKind};
use crate::profile::EngineerProfile;
use crate::search::SearchClient;

pub struct PhaseContext {
    pub llm: LlmHandle,
    pub search: Arc<dyn SearchClient>,
    pub fetcher: Arc<ContentFetcher>,
    pub profile: Arc<EngineerProfile>,
    pub config: Arc<Config>,
    pub events: mpsc::Sender<PipelineEvent>,
    /// Emits `thought` SSE events only when the client asked for them
    /// (spec.md §6 `include_thoughts`).
    pub include_thoughts: bool,
    /// Flips to `true` the first time an SSE send fails, i.e. the client's
    /// receiver has been dropped. A `watch` channel rather than a plain
    /// flag so the bounded-concurrency fan-outs (`ParallelScorer::run`,
    /// `SearchClient::search_batch`, content_enrich's fetch `JoinSet`) can
    /// race their in-flight futures against `changed()` and abort
    /// everything still outstanding the instant a disconnect is observed,
    /// rather than only noticing at the next phase boundary (spec.md §5:
    /// "cancels all pending LLM/search futures").
    cancel_tx: watch::Sender<bool>,
    pub cancel_rx: watch::Receiver<bool>,
    step_counter: Arc<AtomicU32>,
}

impl PhaseContext {
    pub fn new(
        llm: LlmHandle,
        search: Arc<dyn SearchClient>,
        fetcher: Arc<ContentFetcher>,
        profile: Arc<EngineerProfile>,
        config: Arc<Config>,
        events: mpsc::Sender<PipelineEvent>,
        include_thoughts: bool,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            llm,
            search,
            fetcher,
            profile,
            config,
            events,
            include_thoughts,
            cancel_tx,
            cancel_rx,
            step_counter: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub async fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).await.is_err() {
            let _ = self.cancel_tx.send(true);
        }
    }

    fn next_step(&self) -> u32 {
        self.step_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Emits a `thought` event of type `tool_call` (spec.md §6), a no-op
    /// unless the client opted into `include_thoughts`.
    pub async fn emit_tool_call(&self, tool: &'static str, input: serde_json::Value) {
        if !self.include_thoughts {
            return;
        }
        let step = self.next_step();
        self.emit(PipelineEvent::Thought {
            step,
            kind: ThoughtKind::ToolCall,
            tool: Some(tool),
            input: Some(input),
            content: None,
        })
        .await;
    }

    /// Emits the `observation` that follows a `tool_call` with the same
    /// `tool` name -- always called after the corresponding tool_call has
    /// already been emitted, so ordering (spec.md §5) holds by construction.
    pub async fn emit_observation(&self, tool: &'static str, content: String) {
        if !self.include_thoughts {
            return;
        }
        let step = self.next_step();
        self.emit(PipelineEvent::Thought {
            step,
            kind: ThoughtKind::Observation,
            tool: Some(tool),
            input: None,
            content: Some(content),
        })
        .await;
    }

    /// Emits a free-text `reasoning` thought (spec.md §6), e.g. to surface
    /// why a reranker adjusted a score.
    pub async fn emit_reasoning(&self, content: String) {
        if !self.include_thoughts {
            return;
        }
        let step = self.next_step();
        self.emit(PipelineEvent::Thought {
            step,
            kind: ThoughtKind::Reasoning,
            tool: None,
            input: None,
            content: Some(content),
        })
        .await;
    }
}
