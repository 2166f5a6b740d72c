//! Tavily web search.

use crate::components::{SearchHit, WebSearch};
use async_trait::async_trait;
use crag_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com/search";

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Web search through the Tavily API.
///
/// Network errors, 429 and 5xx responses are retried with exponential
/// backoff up to `max_retries` times. Rejected credentials (401/403) are
/// reported as [`AppError::Auth`] without retrying.
#[derive(Debug, Clone)]
pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
    max_results: u32,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u32,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: String,
}

/// A failed attempt, and whether another attempt may succeed.
enum Attempt {
    Retry(AppError),
    Fatal(AppError),
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> AppResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AppError::Config(
                "Tavily search requires an API key".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Search(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_TAVILY_URL.to_string(),
            max_results: 3,
            max_retries: 2,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn search_once(&self, query: &str) -> Result<Vec<SearchHit>, Attempt> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SearchRequest {
                query,
                max_results: self.max_results,
                search_depth: "basic",
            })
            .send()
            .await
            .map_err(|e| Attempt::Retry(AppError::Search(format!("request failed: {}", e))))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Attempt::Retry(AppError::Search(format!("failed to read body: {}", e))))?;
        parse_results(&body).map_err(Attempt::Fatal)
    }
}

fn classify_status(status: StatusCode, body: &str) -> Attempt {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Attempt::Fatal(AppError::auth("tavily", format!("{}: {}", status, body)))
        }
        StatusCode::TOO_MANY_REQUESTS => Attempt::Retry(AppError::Search(format!(
            "rate limited ({}): {}",
            status, body
        ))),
        s if s.is_server_error() => {
            Attempt::Retry(AppError::Search(format!("server error ({}): {}", s, body)))
        }
        s => Attempt::Fatal(AppError::Search(format!("request rejected ({}): {}", s, body))),
    }
}

/// Parse a Tavily response body. Results keep their order, blank content
/// included.
fn parse_results(body: &str) -> AppResult<Vec<SearchHit>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Search(format!("malformed search response: {}", e)))?;

    Ok(response
        .results
        .into_iter()
        .map(|r| SearchHit {
            content: r.content,
            url: r.url,
            title: r.title,
        })
        .collect())
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>> {
        let mut attempt = 0u32;

        loop {
            match self.search_once(query).await {
                Ok(hits) => {
                    debug!("Tavily returned {} results", hits.len());
                    return Ok(hits);
                }
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                    warn!(
                        "Web search failed (attempt {}/{}), retrying in {}ms: {}",
                        attempt,
                        self.max_retries + 1,
                        backoff_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}
