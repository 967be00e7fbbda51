//! LLM vendor client: OpenAI-compatible `chat/completions`, JSON-mode and
//! token-streaming variants, wrapped by a per-vendor circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use super::circuit_breaker::CircuitBreaker;
use super::models::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, LlmError,
    ResponseFormat,
};
use crate::config::LlmConfig;
use crate::pipeline::state::ModelClass;

/// The object-safe surface every phase's LLM calls go through. `complete_json`
/// isn't part of the trait (generic methods aren't object-safe) -- it's an
/// inherent method on `LlmHandle` below, layered on top of `complete_text`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete_text(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, LlmError>;

    async fn stream_completion(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(), LlmError>;
}

/// Cheaply cloneable handle phases hold onto (`PhaseContext::llm`). Wraps
/// whichever `LlmBackend` the engine was built with -- the real vendor client
/// in production, a scripted fake in tests -- and supplies the one method
/// that can't live on the trait object itself.
#[derive(Clone)]
pub struct LlmHandle(Arc<dyn LlmBackend>);

impl LlmHandle {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self(backend)
    }

    pub async fn complete_text(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        self.0.complete_text(class, system_prompt, user_prompt, json_mode).await
    }

    /// Single JSON-mode call. Used by every phase except P5's token stream.
    /// Deserialises the normalised content string as `T` on success.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<T, LlmError> {
        let content = self.complete_text(class, system_prompt, user_prompt, true).await?;
        serde_json::from_str(&content).map_err(|e| LlmError::Parse(e.to_string()))
    }

    pub async fn stream_completion(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(), LlmError> {
        self.0.stream_completion(class, system_prompt, user_prompt, tx).await
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    api_key: String,
    breaker: CircuitBreaker,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                config.reasoning_timeout_secs.max(config.standard_timeout_secs) + 5,
            ))
            .build()
            .expect("reqwest client builds with static config");
        let breaker = CircuitBreaker::new(
            "llm",
            5,
            Duration::from_secs(60),
            Duration::from_secs(30),
        );
        Self { http, config, api_key, breaker }
    }

    fn model_for(&self, class: ModelClass) -> &str {
        match class {
            ModelClass::Reasoning => &self.config.reasoning_model_id,
            ModelClass::Standard => &self.config.standard_model_id,
        }
    }

    fn timeout_for(&self, class: ModelClass) -> Duration {
        match class {
            ModelClass::Reasoning => Duration::from_secs(self.config.reasoning_timeout_secs),
            ModelClass::Standard => Duration::from_secs(self.config.standard_timeout_secs),
        }
    }

    async fn dispatch(
        &self,
        class: ModelClass,
        request: &ChatCompletionRequest,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(self.timeout_for(class))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_for(class).as_secs())
                } else {
                    LlmError::Api(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("status {status}: {body}")));
        }

        let body: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("empty choices array".to_string()))?;

        Ok(choice.message.content.into_text())
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    /// Single call returning the normalised text content (used for the P1
    /// repair-prompt retry, and internally by `LlmHandle::complete_json`).
    async fn complete_text(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        self.breaker.check().map_err(LlmError::CircuitOpen)?;

        let request = ChatCompletionRequest {
            model: self.model_for(class).to_string(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            temperature: 0.0,
            response_format: json_mode.then_some(ResponseFormat { format_type: "json_object" }),
            stream: false,
        };

        let result = self.dispatch(class, &request).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.is_retryable() => self.breaker.record_failure(),
            Err(_) => {},
        }
        result
    }

    /// Token-streaming call for P5 (spec.md §4.8: "this phase alone streams
    /// tokens as they are produced"). Each normalised text delta is sent on
    /// `tx` as it arrives; the receiver end drives the SSE `response` events.
    /// Returns once the stream ends or an error occurs; dropping `tx`'s
    /// receiver (client disconnect) causes `send` to fail, which this loop
    /// treats as a cancellation signal and stops immediately.
    async fn stream_completion(
        &self,
        class: ModelClass,
        system_prompt: &str,
        user_prompt: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(), LlmError> {
        self.breaker.check().map_err(LlmError::CircuitOpen)?;

        let request = ChatCompletionRequest {
            model: self.model_for(class).to_string(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            temperature: 0.3,
            response_format: None,
            stream: true,
        };

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(self.timeout_for(class))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_for(class).as_secs())
                } else {
                    LlmError::Api(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            self.breaker.record_failure();
            return Err(LlmError::Api(format!("status {}", response.status())));
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Api(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(idx) = buffer.find("\n\n") {
                let event = buffer[..idx].to_string();
                buffer.drain(..idx + 2);
                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        self.breaker.record_success();
                        return Ok(());
                    }
                    let parsed: Result<ChatCompletionChunk, _> = serde_json::from_str(data);
                    if let Ok(parsed) = parsed
                        && let Some(choice) = parsed.choices.into_iter().next()
                        && let Some(delta) = choice.delta.content
                        && tx.send(delta).await.is_err()
                    {
                        // receiver dropped: client disconnected mid-stream
                        return Ok(());
                    }
                }
            }
        }

        self.breaker.record_success();
        Ok(())
    }
}

/// Scripted backend for phase/engine tests: `complete_text` pops the next
/// queued response in call order (so a retry-then-degrade sequence can be
/// scripted as two entries); `stream_completion` sends `stream_chunks`
/// verbatim. Exhausting the queue is a test bug, not a production path, so it
/// returns a `Parse` error rather than panicking.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    stream_chunks: Vec<String>,
}

#[cfg(test)]
impl FakeLlmClient {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self { responses: std::sync::Mutex::new(responses.into()), stream_chunks: Vec::new() }
    }

    pub fn with_stream_chunks(mut self, chunks: Vec<&str>) -> Self {
        self.stream_chunks = chunks.into_iter().map(String::from).collect();
        self
    }
}

#[cfg(test)]
#[async_trait]
impl LlmBackend for FakeLlmClient {
    async fn complete_text(
        &self,
        _class: ModelClass,
        _system_prompt: &str,
        _user_prompt: &str,
        _json_mode: bool,
    ) -> Result<String, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Parse("FakeLlmClient queue exhausted".to_string())))
    }

    async fn stream_completion(
        &self,
        _class: ModelClass,
        _system_prompt: &str,
        _user_prompt: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(), LlmError> {
        for chunk in &self.stream_chunks {
            if tx.send(chunk.clone()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
