pub mod client;
pub mod industry;

pub use client::{HttpSearchClient, SearchClient, SearchError, SearchHit};

#[cfg(test)]
pub use client::StaticSearchClient;
