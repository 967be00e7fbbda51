//! SSE event grammar (spec.md §6). The SSE wire frame for each event is
//! `event: <name>\ndata: <json>\n\n`; `name()`/`data()` below are what the
//! handler calls to build that frame directly, field by field -- there is
//! no single `Serialize` impl on the whole enum, because that would nest
//! the payload one level too deep (`{"event":..,"data":{...}}` inside the
//! `data:` line instead of the bare payload object the grammar specifies).

use serde::Serialize;

use crate::pipeline::router::Phase;
use crate::pipeline::state::{
    CompanyVerifiability, QueryType, RecommendedAction, ResearchQualityTier, RiskLevel, Tier,
};

/// The `phase_complete.data` structured summary (spec.md §6), one shape per
/// phase. `#[serde(untagged)]` so the wire object is just the variant's own
/// fields -- no synthetic discriminant key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PhaseCompleteData {
    Connecting {
        query_type: QueryType,
        company_name: Option<String>,
        job_title: Option<String>,
        extracted_skills: Vec<String>,
    },
    DeepResearch {
        search_attempt: u32,
        tech_stack_count: usize,
        requirements_count: usize,
        source_count: usize,
    },
    ResearchReranker {
        data_quality_tier: ResearchQualityTier,
        research_quality_tier: ResearchQualityTier,
        confidence_score: i32,
        recommended_action: RecommendedAction,
        company_verifiability: CompanyVerifiability,
    },
    ContentEnrich {
        enriched_count: usize,
        attempted_count: usize,
    },
    SkepticalComparison {
        strengths_count: usize,
        gaps_count: usize,
        risk_assessment: RiskLevel,
    },
    SkillsMatching {
        match_score: i32,
        matched_count: usize,
        unmatched_count: usize,
        has_fundamental_mismatch: bool,
    },
    ConfidenceReranker {
        calibrated_score: Option<i32>,
        tier: Tier,
        adjustment_rationale: String,
    },
    GenerateResults {
        report_chars: usize,
    },
}

/// The `status` enum named in spec.md §6's SSE grammar table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Connecting,
    Researching,
    Comparing,
    Matching,
    Scoring,
    Generating,
}

impl RunStatus {
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Connecting => Self::Connecting,
            Phase::DeepResearch | Phase::ResearchReranker | Phase::ContentEnrich => {
                Self::Researching
            },
            Phase::SkepticalComparison => Self::Comparing,
            Phase::SkillsMatching => Self::Matching,
            Phase::ConfidenceReranker => Self::Scoring,
            Phase::GenerateResults => Self::Generating,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Researching => "researching",
            Self::Comparing => "comparing",
            Self::Matching => "matching",
            Self::Scoring => "scoring",
            Self::Generating => "generating",
        }
    }
}

/// The `thought.data.type` enum (spec.md §6): a tool invocation, the
/// observation that resolves it, or a free-text reasoning fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThoughtKind {
    ToolCall,
    Observation,
    Reasoning,
}

impl ThoughtKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::Observation => "observation",
            Self::Reasoning => "reasoning",
        }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Emitted once per phase transition, ahead of that phase's own
    /// `phase_start` (spec.md §6: `{status, message}`).
    Status { status: RunStatus, message: String },

    /// Emitted when a phase begins executing.
    PhaseStart { phase: &'static str, attempt: u32 },

    /// Emitted when a phase finishes, carrying the phase-specific
    /// structured summary spec.md §6 mandates -- never the full state.
    PhaseComplete { phase: &'static str, data: PhaseCompleteData },

    /// Only emitted when `include_thoughts` is true. A `tool_call` is
    /// always followed, later, by an `observation` carrying the same
    /// `tool` name; `reasoning` thoughts stand alone (spec.md §6).
    Thought {
        step: u32,
        kind: ThoughtKind,
        tool: Option<&'static str>,
        input: Option<serde_json::Value>,
        content: Option<String>,
    },

    /// Streamed token fragments from P5's `stream_completion` (spec.md
    /// §4.8); the client concatenates these to build `final_report`.
    Response { text: String },

    /// Terminal success event. Always the last event on a successful run
    /// (spec.md §6: `{duration_ms, final_status}`).
    Complete { duration_ms: u64, final_status: &'static str },

    /// Terminal failure event. Always the last event when the pipeline
    /// cannot proceed (spec.md §7); never followed by `Complete`.
    Error { code: &'static str, message: String },
}

impl PipelineEvent {
    pub fn phase_start(phase: Phase, attempt: u32) -> Self {
        Self::PhaseStart { phase: phase.as_str(), attempt }
    }

    pub fn phase_complete(phase: Phase, data: PhaseCompleteData) -> Self {
        Self::PhaseComplete { phase: phase.as_str(), data }
    }

    /// The SSE `event:` line value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::PhaseStart { .. } => "phase_start",
            Self::PhaseComplete { .. } => "phase_complete",
            Self::Thought { .. } => "thought",
            Self::Response { .. } => "response",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// The SSE `data:` line payload -- this event's own fields only, not
    /// wrapped in the variant name or a redundant `event`/`data` envelope.
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::Status { status, message } => {
                serde_json::json!({ "status": status.as_str(), "message": message })
            },
            Self::PhaseStart { phase, attempt } => {
                serde_json::json!({ "phase": phase, "attempt": attempt })
            },
            Self::PhaseComplete { phase, data } => {
                serde_json::json!({ "phase": phase, "data": data })
            },
            Self::Thought { step, kind, tool, input, content } => serde_json::json!({
                "step": step,
                "type": kind.as_str(),
                "tool": tool,
                "input": input,
                "content": content,
            }),
            Self::Response { text } => serde_json::json!({ "chunk": text }),
            Self::Complete { duration_ms, final_status } => serde_json::json!({
                "duration_ms": duration_ms,
                "final_status": final_status,
            }),
            Self::Error { code, message } => serde_json::json!({ "code": code, "message": message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_has_flat_data_payload() {
        let event = PipelineEvent::Status {
            status: RunStatus::Connecting,
            message: "connecting".to_string(),
        };
        assert_eq!(event.name(), "status");
        assert_eq!(event.data()["status"], "connecting");
        assert_eq!(event.data()["message"], "connecting");
        // The payload must not itself be wrapped in an "event"/"data" envelope.
        assert!(event.data().get("event").is_none());
    }

    #[test]
    fn run_status_maps_research_phases_to_researching() {
        assert_eq!(RunStatus::for_phase(Phase::DeepResearch), RunStatus::Researching);
        assert_eq!(RunStatus::for_phase(Phase::ResearchReranker), RunStatus::Researching);
        assert_eq!(RunStatus::for_phase(Phase::ContentEnrich), RunStatus::Researching);
        assert_eq!(RunStatus::for_phase(Phase::SkillsMatching), RunStatus::Matching);
    }

    #[test]
    fn error_event_carries_a_stable_code() {
        let event = PipelineEvent::Error { code: "TIMEOUT", message: "deadline exceeded".to_string() };
        assert_eq!(event.data()["code"], "TIMEOUT");
    }

    #[test]
    fn complete_event_carries_duration_and_final_status() {
        let event = PipelineEvent::Complete { duration_ms: 4200, final_status: "completed" };
        assert_eq!(event.name(), "complete");
        assert_eq!(event.data()["duration_ms"], 4200);
        assert_eq!(event.data()["final_status"], "completed");
        assert!(event.data().get("match_score").is_none());
    }

    #[test]
    fn tool_call_thought_carries_input_and_no_content() {
        let event = PipelineEvent::Thought {
            step: 1,
            kind: ThoughtKind::ToolCall,
            tool: Some("web_search"),
            input: Some(serde_json::json!({"queries": ["rust engineer"]})),
            content: None,
        };
        assert_eq!(event.name(), "thought");
        assert_eq!(event.data()["type"], "tool_call");
        assert_eq!(event.data()["tool"], "web_search");
        assert!(event.data()["content"].is_null());
    }

    #[test]
    fn observation_thought_carries_content_and_no_input() {
        let event = PipelineEvent::Thought {
            step: 2,
            kind: ThoughtKind::Observation,
            tool: Some("web_search"),
            input: None,
            content: Some("found 5 results".to_string()),
        };
        assert_eq!(event.data()["type"], "observation");
        assert!(event.data()["input"].is_null());
        assert_eq!(event.data()["content"], "found 5 results");
    }

    #[test]
    fn phase_complete_embeds_structured_research_reranker_payload() {
        let event = PipelineEvent::phase_complete(
            Phase::ResearchReranker,
            PhaseCompleteData::ResearchReranker {
                data_quality_tier: ResearchQualityTier::Medium,
                research_quality_tier: ResearchQualityTier::Medium,
                confidence_score: 62,
                recommended_action: RecommendedAction::Continue,
                company_verifiability: CompanyVerifiability::Verified,
            },
        );
        let data = event.data();
        assert_eq!(data["phase"], "research_reranker");
        assert_eq!(data["data"]["confidence_score"], 62);
        assert_eq!(data["data"]["recommended_action"], "CONTINUE");
    }
}
