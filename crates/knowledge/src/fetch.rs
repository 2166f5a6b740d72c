//! Remote sources fetched over HTTP.

use crate::parser::{self, ContentType};
use crag_core::{AppError, AppResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Build the client used for every URL of one learn call.
pub fn client() -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(concat!("crag/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Knowledge(format!("Failed to create HTTP client: {}", e)))
}

/// Download a page and extract its text.
pub async fn fetch_url(client: &Client, url: &str) -> AppResult<(String, ContentType)> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::Knowledge(format!("Unsupported URL: {}", url)));
    }

    tracing::debug!("Fetching {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Knowledge(format!(
            "Fetching {} returned HTTP {}",
            url, status
        )));
    }

    let header = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_type = ContentType::from_response(header.as_deref(), url);

    let body = response
        .bytes()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to read body of {}: {}", url, e)))?;

    let text = parser::extract_text(&body, content_type, url)?;
    Ok((text, content_type))
}
