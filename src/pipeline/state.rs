//! The accumulated pipeline state record (spec.md §3). Fields are written
//! only by their owning phase; later phases read but never mutate earlier
//! fields, with the two documented exceptions `messages`/`quality_flags`
//! (monotonic append) and `search_attempt` (owned exclusively by the
//! router, spec.md §4.3/§4.9/§9).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::search::client::SearchHit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    Reasoning,
    Standard,
}

impl ModelClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Company,
    JobDescription,
    Irrelevant,
    Adversarial,
}

impl QueryType {
    pub fn is_terminal_refusal(self) -> bool {
        matches!(self, Self::Irrelevant | Self::Adversarial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResearchQualityTier {
    High,
    Medium,
    Low,
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Continue,
    EnhanceSearch,
    FlagLowData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompanyVerifiability {
    Verified,
    Partial,
    Unverified,
    Suspicious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    SparseTechStack,
    NoRequirements,
    UnverifiedCompany,
    HallucinationRisk,
    OutdatedData,
    SingleSource,
    InferredIndustry,
    SearchFailed,
    FundamentalMismatch,
    ParseFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    High,
    MediumHigh,
    Medium,
    MediumLow,
    Low,
    InsufficientData,
}

impl Tier {
    /// Coerces a calibrated score into the tier band it belongs to
    /// (spec.md §3 invariant 3). Used both by P5b's own derivation and by
    /// the router's invariant-violation-coercion path (spec.md §7 kind 5).
    pub fn from_score(score: i32) -> Self {
        match score {
            70..=100 => Self::High,
            60..=69 => Self::MediumHigh,
            45..=59 => Self::Medium,
            30..=44 => Self::MediumLow,
            1..=29 => Self::Low,
            _ => Self::InsufficientData,
        }
    }

    pub fn is_consistent_with(self, score: Option<i32>) -> bool {
        match (self, score) {
            (Self::InsufficientData, None) => true,
            (Self::InsufficientData, Some(_)) => false,
            (_, None) => false,
            (tier, Some(score)) => Self::from_score(score) == tier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strength {
    pub claim: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub requirement: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedSourceRef {
    pub url: String,
    pub extracted_text: String,
    pub kb_size: f64,
}

/// The single record accumulated across all eight phases of one request.
/// Never shared across requests (spec.md §5 "Shared state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    // --- client-owned, immutable after request start ---
    pub query: String,
    pub model_class: ModelClass,
    pub include_thoughts: bool,

    // --- P1 Connecting ---
    pub query_type: Option<QueryType>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub extracted_skills: HashSet<String>,

    // --- P2 Deep Research (search_attempt owned by the router, not P2) ---
    pub search_attempt: u32,
    pub employer_summary: String,
    pub tech_stack: Vec<String>,
    pub requirements: Vec<String>,
    pub culture_signals: Vec<String>,
    pub raw_search_results: Vec<SearchHit>,

    // --- P2b Research Reranker ---
    pub research_quality_tier: Option<ResearchQualityTier>,
    pub data_confidence_score: Option<i32>,
    pub quality_flags: HashSet<QualityFlag>,
    pub recommended_action: Option<RecommendedAction>,
    pub enhancement_queries: Vec<String>,
    pub company_verifiability: Option<CompanyVerifiability>,

    // --- P2c Content Enrich ---
    pub enriched_sources: Vec<EnrichedSourceRef>,

    // --- P3 Skeptical Comparison ---
    pub strengths: Vec<Strength>,
    pub gaps: Vec<Gap>,
    pub risk_assessment: Option<RiskLevel>,

    // --- P4 Skills Matching ---
    pub match_score: Option<i32>,
    pub matched: Vec<String>,
    pub unmatched: Vec<String>,
    pub has_fundamental_mismatch: bool,

    // --- P5b Confidence Reranker ---
    pub calibrated_score: Option<i32>,
    pub tier: Option<Tier>,
    pub adjustment_rationale: String,

    // --- P5 Generate Results ---
    pub final_report: String,

    pub error: Option<String>,
}

impl PipelineState {
    pub fn new(query: String, model_class: ModelClass, include_thoughts: bool) -> Self {
        Self {
            query,
            model_class,
            include_thoughts,
            query_type: None,
            company_name: None,
            job_title: None,
            extracted_skills: HashSet::new(),
            search_attempt: 0,
            employer_summary: String::new(),
            tech_stack: Vec::new(),
            requirements: Vec::new(),
            culture_signals: Vec::new(),
            raw_search_results: Vec::new(),
            research_quality_tier: None,
            data_confidence_score: None,
            quality_flags: HashSet::new(),
            recommended_action: None,
            enhancement_queries: Vec::new(),
            company_verifiability: None,
            enriched_sources: Vec::new(),
            strengths: Vec::new(),
            gaps: Vec::new(),
            risk_assessment: None,
            match_score: None,
            matched: Vec::new(),
            unmatched: Vec::new(),
            has_fundamental_mismatch: false,
            calibrated_score: None,
            tier: None,
            adjustment_rationale: String::new(),
            final_report: String::new(),
            error: None,
        }
    }

    pub fn add_quality_flag(&mut self, flag: QualityFlag) {
        self.quality_flags.insert(flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_bands_match_spec_table() {
        assert_eq!(Tier::from_score(100), Tier::High);
        assert_eq!(Tier::from_score(70), Tier::High);
        assert_eq!(Tier::from_score(69), Tier::MediumHigh);
        assert_eq!(Tier::from_score(60), Tier::MediumHigh);
        assert_eq!(Tier::from_score(59), Tier::Medium);
        assert_eq!(Tier::from_score(45), Tier::Medium);
        assert_eq!(Tier::from_score(44), Tier::MediumLow);
        assert_eq!(Tier::from_score(30), Tier::MediumLow);
        assert_eq!(Tier::from_score(29), Tier::Low);
        assert_eq!(Tier::from_score(1), Tier::Low);
        assert_eq!(Tier::from_score(0), Tier::InsufficientData);
    }

    #[test]
    fn insufficient_data_tier_requires_no_score() {
        assert!(Tier::InsufficientData.is_consistent_with(None));
        assert!(!Tier::InsufficientData.is_consistent_with(Some(10)));
        assert!(!Tier::High.is_consistent_with(None));
        assert!(Tier::High.is_consistent_with(Some(85)));
    }
}
