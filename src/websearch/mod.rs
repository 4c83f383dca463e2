//! Web search tool: a Brave-Search-style HTTP client.
//!
//! Same `reqwest` client idiom as the other provider clients in this crate
//! (Bearer auth header, typed request/response DTOs, explicit timeout).
//! Every failure mode collapses to an empty result list with a logged
//! warning — the provider must never raise, so the retrieval state machine
//! can treat a down provider exactly like zero results.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::WebResult;

#[async_trait]
pub trait WebSearchTool: Send + Sync {
    async fn search_recent(&self, query: &str, num_results: usize, days_back: u32) -> Vec<WebResult>;
    async fn search_educational(&self, query: &str, num_results: usize) -> Vec<WebResult>;
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    description: Option<String>,
    age: Option<String>,
}

pub struct BraveWebSearchTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BraveWebSearchTool {
    pub fn new(base_url: String, api_key: Option<String>, timeout_ms: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            api_key,
        }
    }

    async fn run_query(&self, query: &str, num_results: usize, freshness: Option<&str>) -> Vec<WebResult> {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("count", &num_results.to_string())]);

        if let Some(freshness) = freshness {
            request = request.query(&[("freshness", freshness)]);
        }
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "web search request failed, returning empty results");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "web search provider returned an error status");
            return Vec::new();
        }

        let parsed: BraveSearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse web search response");
                return Vec::new();
            }
        };

        let Some(web) = parsed.web else {
            return Vec::new();
        };

        web.results
            .into_iter()
            .take(num_results)
            .enumerate()
            .map(|(rank, r)| WebResult {
                title: r.title,
                url: r.url,
                published_date: r.age,
                snippet: r.description.unwrap_or_default(),
                score: rank_to_score(rank, num_results),
            })
            .collect()
    }
}

/// The provider returns results already ranked; map rank position to a
/// `[0,1]` descending score so web results compare on the same scale as
/// cosine-derived PDF scores in the fused context.
fn rank_to_score(rank: usize, total: usize) -> f32 {
    if total <= 1 {
        return 1.0;
    }
    1.0 - (rank as f32 / total as f32) * 0.5
}

#[async_trait]
impl WebSearchTool for BraveWebSearchTool {
    async fn search_recent(&self, query: &str, num_results: usize, days_back: u32) -> Vec<WebResult> {
        let freshness = match days_back {
            0..=1 => Some("pd"),
            2..=7 => Some("pw"),
            8..=31 => Some("pm"),
            _ => Some("py"),
        };
        self.run_query(query, num_results, freshness).await
    }

    async fn search_educational(&self, query: &str, num_results: usize) -> Vec<WebResult> {
        self.run_query(query, num_results, None).await
    }
}
