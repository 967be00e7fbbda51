//! Industry inference table: fallback tech-stack defaults keyed by detected
//! industry, consulted on attempt 2 when searches return sparse data
//! (spec.md §4.2).

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub static INDUSTRY_TECH_DEFAULTS: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        HashMap::from([
            ("fintech", ["Java", "Kotlin", "PostgreSQL", "Kafka", "AWS"].as_slice()),
            ("ai_ml", ["Python", "PyTorch", "CUDA", "Kubernetes", "Ray"].as_slice()),
            ("saas_b2b", ["TypeScript", "React", "Node.js", "PostgreSQL", "AWS"].as_slice()),
            ("e_commerce", ["Java", "MySQL", "Redis", "Kafka", "Kubernetes"].as_slice()),
            (
                "streaming_media",
                ["Go", "Kubernetes", "gRPC", "Kafka", "CDN edge caching"].as_slice(),
            ),
        ])
    });

/// Crude keyword-based industry detector over an employer summary and job
/// title. Returns `None` when nothing matches, in which case no fallback
/// tech-stack defaults are injected -- the phase is expected to set the
/// `inferred_industry` quality flag only when this returns `Some`.
pub fn detect_industry(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    const KEYWORDS: &[(&str, &[&str])] = &[
        ("fintech", &["fintech", "payments", "banking", "trading", "lending"]),
        ("ai_ml", &["machine learning", "artificial intelligence", " ai ", "ml platform", "llm"]),
        ("saas_b2b", &["saas", "b2b", "enterprise software", "subscription platform"]),
        ("e_commerce", &["e-commerce", "ecommerce", "marketplace", "retail platform"]),
        ("streaming_media", &["streaming", "video platform", "media delivery", "cdn"]),
    ];

    for (industry, keywords) in KEYWORDS {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return Some(industry);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_fintech_from_keywords() {
        assert_eq!(detect_industry("Leading payments and banking infrastructure"), Some("fintech"));
    }

    #[test]
    fn returns_none_when_no_keyword_matches() {
        assert_eq!(detect_industry("A generic description with no hints"), None);
    }

    #[test]
    fn table_covers_all_five_named_industries() {
        for industry in ["fintech", "ai_ml", "saas_b2b", "e_commerce", "streaming_media"] {
            assert!(INDUSTRY_TECH_DEFAULTS.contains_key(industry));
        }
    }
}
