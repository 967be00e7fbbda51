//! Wire types for the LLM vendor's OpenAI-compatible chat completion API.

use serde::{Deserialize, Serialize};

/// LLM collaborator errors. Converts into [`crate::error::PipelineError`] at
/// the phase boundary; phases that can tolerate this error apply their
/// documented degraded path instead of propagating it (spec.md §7 kind 3).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM response parsing error: {0}")]
    Parse(String),

    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("circuit open, retry after {0}s")]
    CircuitOpen(u64),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::Api(_))
    }
}

impl From<LlmError> for crate::error::PipelineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::CircuitOpen(secs) => {
                Self::CircuitOpen { collaborator: "llm", retry_after_secs: secs }
            },
            LlmError::RateLimited(_) => Self::RateLimited,
            other => Self::Llm(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: ChatContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: ChatContent::Text(text.into()) }
    }
}

/// The LLM response's `content` field is either a plain string or a list of
/// content parts (spec.md §6, §9 "LLM response shape variability"). Both
/// shapes round-trip through this enum so every caller normalises the same
/// way via [`ChatContent::into_text`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "type", default)]
    pub part_type: Option<String>,
}

impl ChatContent {
    /// Normalises either wire shape into a single string, per the design
    /// note in spec.md §9: concatenate parts' `.text` fields, or stringify
    /// otherwise.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Parts(parts) => parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A single streamed chunk from the SSE-style `chat/completions` stream the
/// vendor returns when `stream: true` (P5 only, per spec.md §4.8).
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ChunkChoice {
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(super) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_plain_string_content() {
        let content = ChatContent::Text("hello".to_string());
        assert_eq!(content.into_text(), "hello");
    }

    #[test]
    fn normalises_content_parts_by_concatenating_text() {
        let content = ChatContent::Parts(vec![
            ContentPart { text: Some("hel".to_string()), part_type: Some("text".to_string()) },
            ContentPart { text: Some("lo".to_string()), part_type: None },
            ContentPart { text: None, part_type: Some("image".to_string()) },
        ]);
        assert_eq!(content.into_text(), "hello");
    }
}
