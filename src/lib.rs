//! Fit-Check Analysis Engine
//!
//! A multi-phase, stateful LLM pipeline that streams a structured
//! fit-check assessment of a fixed engineer profile against a free-text
//! query naming an employer or describing a job.
//!
//! Design philosophy: Rust's type system IS our DI container. `AppState`
//! holds the handful of `Arc`-wrapped collaborators every handler needs;
//! no service-locator, no `dyn Any` container.

use std::sync::Arc;

pub mod config;
pub mod embedded;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod llm;
pub mod pipeline;
pub mod profile;
pub mod search;

pub use config::Config;
pub use pipeline::PipelineEngine;
pub use profile::EngineerProfile;

/// Application shared state. Cheap to clone (every field is an `Arc`), one
/// instance per process, handed to every axum handler via `.with_state`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<PipelineEngine>,
    pub profile: Arc<EngineerProfile>,
}
