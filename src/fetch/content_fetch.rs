//! HTTP(S) content enrichment fetcher (spec.md §4.4, P2c). Never fails the
//! pipeline: every error is swallowed into an omitted source plus a flag
//! that the caller records.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::FetchConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedSource {
    pub url: String,
    pub extracted_text: String,
    pub kb_size: f64,
}

pub struct ContentFetcher {
    http: reqwest::Client,
    config: FetchConfig,
}

impl ContentFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.per_fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .expect("reqwest client builds with static config");
        Self { http, config }
    }

    /// Fetches one URL. Returns `None` on any 4xx/5xx/TLS/timeout failure --
    /// the caller records an `omitted source` quality signal and proceeds,
    /// per spec.md §4.4's "phase never fails the pipeline" contract.
    pub async fn fetch_one(&self, url: &str) -> Option<EnrichedSource> {
        let response = match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(url, status = %resp.status(), "content fetch failed");
                return None;
            },
            Err(e) => {
                tracing::debug!(url, error = %e, "content fetch failed");
                return None;
            },
        };

        let html = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url, error = %e, "content fetch body read failed");
                return None;
            },
        };

        let mut text = extract_readable_text(&html);
        let cap = self.config.max_source_bytes;
        let mut truncated = false;
        if text.len() > cap {
            while !text.is_char_boundary(cap.min(text.len())) {
                text.pop();
            }
            text.truncate(cap);
            truncated = true;
        }
        if truncated {
            text.push_str("\n\n[... truncated ...]");
        }

        let kb_size = text.len() as f64 / 1024.0;
        Some(EnrichedSource { url: url.to_string(), extracted_text: text, kb_size })
    }
}

static STRIP_TAGS: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer|header)\b[^>]*>.*?</\1>").expect("static pattern")
});
static ANY_TAG: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("static pattern"));
static WHITESPACE: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Readability heuristic: strip non-content tags and their contents, strip
/// the remaining markup, collapse whitespace (spec.md §4.4).
fn extract_readable_text(html: &str) -> String {
    let without_noise = STRIP_TAGS.replace_all(html, "");
    let without_tags = ANY_TAG.replace_all(&without_noise, " ");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_nav_content_entirely() {
        let html = "<html><nav>Home | About</nav><script>track();</script><p>Real content.</p></html>";
        let text = extract_readable_text(html);
        assert_eq!(text, "Real content.");
    }

    #[test]
    fn collapses_whitespace_and_decodes_entities() {
        let html = "<p>Fish &amp;   Chips</p>\n\n<p>More</p>";
        let text = extract_readable_text(html);
        assert_eq!(text, "Fish & Chips More");
    }
}
