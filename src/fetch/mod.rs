pub mod content_fetch;

pub use content_fetch::{ContentFetcher, EnrichedSource};
