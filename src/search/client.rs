//! Web-search collaborator (spec.md §6): batch-preferred, single-query
//! fallback, wrapped by a circuit breaker.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::SearchConfig;
use crate::llm::circuit_breaker::CircuitBreaker;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search provider error: {0}")]
    Provider(String),
    #[error("search timed out after {0}s")]
    Timeout(u64),
    #[error("circuit open, retry after {0}s")]
    CircuitOpen(u64),
}

impl From<SearchError> for crate::error::PipelineError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::CircuitOpen(secs) => {
                Self::CircuitOpen { collaborator: "search", retry_after_secs: secs }
            },
            other => Self::Search(other.to_string()),
        }
    }
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// `cancel` is raced against every in-flight query so a client
    /// disconnect mid-batch aborts the remaining searches immediately
    /// (spec.md §5) instead of waiting for the batch to finish.
    async fn search_batch(
        &self,
        queries: &[String],
        cancel: watch::Receiver<bool>,
    ) -> Vec<Result<Vec<SearchHit>, SearchError>>;
}

pub struct HttpSearchClient {
    http: reqwest::Client,
    config: SearchConfig,
    api_key: String,
    breaker: CircuitBreaker,
}

impl HttpSearchClient {
    pub fn new(config: SearchConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.per_query_timeout_secs + 2))
            .build()
            .expect("reqwest client builds with static config");
        let breaker =
            CircuitBreaker::new("search", 5, Duration::from_secs(60), Duration::from_secs(30));
        Self { http, config, api_key, breaker }
    }

    /// Stateless single-query call, run inside a spawned task by
    /// `search_batch` -- breaker bookkeeping happens in the caller once the
    /// task rejoins, since `CircuitBreaker` isn't `Send`-cloneable here.
    async fn do_search(
        http: &reqwest::Client,
        api_base: &str,
        api_key: &str,
        timeout_secs: u64,
        query: &str,
    ) -> Result<Vec<SearchHit>, SearchError> {
        #[derive(Serialize)]
        struct Req<'a> {
            query: &'a str,
            max_results: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            results: Vec<SearchHit>,
        }

        let result = http
            .post(format!("{}/search", api_base.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&Req { query, max_results: 10 })
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Resp>()
                .await
                .map(|r| r.results)
                .map_err(|e| SearchError::Provider(e.to_string())),
            Ok(resp) => Err(SearchError::Provider(format!("status {}", resp.status()))),
            Err(e) if e.is_timeout() => Err(SearchError::Timeout(timeout_secs)),
            Err(e) => Err(SearchError::Provider(e.to_string())),
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    /// Issues every query concurrently. The caller never exceeds N ≤ 5
    /// queries per attempt (spec.md §4.2/§5), so no additional semaphore is
    /// needed here; dedup-by-URL is left to the caller since it spans the
    /// whole batch, not a single query's hits.
    async fn search_batch(
        &self,
        queries: &[String],
        mut cancel: watch::Receiver<bool>,
    ) -> Vec<Result<Vec<SearchHit>, SearchError>> {
        if let Err(retry_after) = self.breaker.check() {
            return queries.iter().map(|_| Err(SearchError::CircuitOpen(retry_after))).collect();
        }

        let mut set = tokio::task::JoinSet::new();
        for (index, query) in queries.iter().cloned().enumerate() {
            let http = self.http.clone();
            let api_base = self.config.api_base.clone();
            let api_key = self.api_key.clone();
            let timeout_secs = self.config.per_query_timeout_secs;
            set.spawn(async move {
                let result =
                    Self::do_search(&http, &api_base, &api_key, timeout_secs, &query).await;
                (index, result)
            });
        }

        let mut slots: std::collections::HashMap<usize, Result<Vec<SearchHit>, SearchError>> =
            std::collections::HashMap::new();
        loop {
            if *cancel.borrow() {
                set.abort_all();
                break;
            }
            tokio::select! {
                joined = set.join_next() => {
                    match joined {
                        Some(Ok((index, result))) => {
                            let is_err = result.is_err();
                            slots.insert(index, result);
                            if is_err {
                                self.breaker.record_failure();
                            } else {
                                self.breaker.record_success();
                            }
                        },
                        Some(Err(_)) => {},
                        None => break,
                    }
                },
                _ = cancel.changed() => {},
            }
        }

        (0..queries.len())
            .map(|i| {
                slots
                    .remove(&i)
                    .unwrap_or_else(|| Err(SearchError::Provider("task join failed".into())))
            })
            .collect()
    }
}

#[cfg(test)]
pub struct StaticSearchClient {
    pub hits: Vec<SearchHit>,
}

#[cfg(test)]
#[async_trait]
impl SearchClient for StaticSearchClient {
    async fn search_batch(
        &self,
        queries: &[String],
        _cancel: watch::Receiver<bool>,
    ) -> Vec<Result<Vec<SearchHit>, SearchError>> {
        queries.iter().map(|_| Ok(self.hits.clone())).collect()
    }
}
