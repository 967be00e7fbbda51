pub mod confidence_reranker;
pub mod connecting;
pub mod content_enrich;
pub mod deep_research;
pub mod generate_results;
pub mod research_reranker;
pub mod skeptical_comparison;
pub mod skills_matching;
