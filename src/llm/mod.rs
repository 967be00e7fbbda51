pub mod circuit_breaker;
pub mod client;
pub mod judge;
pub mod models;
pub mod prompt_loader;

pub use client::{LlmBackend, LlmClient, LlmHandle};
pub use judge::ParallelScorer;
pub use models::{ChatContent, LlmError};
pub use prompt_loader::PromptLoader;

#[cfg(test)]
pub use client::FakeLlmClient;
