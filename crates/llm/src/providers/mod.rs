//! LLM provider implementations.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crag_core::AppError;
use reqwest::StatusCode;

/// Map a non-success HTTP status from a provider to an `AppError`.
///
/// 401 and 403 mean the credentials were rejected and surface as
/// `AppError::Auth`; everything else is a generic provider failure.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::auth(
            provider,
            format!("{} ({})", body.trim(), status),
        ),
        _ => AppError::Llm(format!("{} API error ({}): {}", provider, status, body.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_maps_to_auth() {
        let err = status_error("openai", StatusCode::UNAUTHORIZED, "invalid key");
        assert!(err.is_auth());
        let err = status_error("openai", StatusCode::FORBIDDEN, "no access");
        assert!(err.is_auth());
    }

    #[test]
    fn test_server_error_maps_to_llm() {
        let err = status_error("ollama", StatusCode::INTERNAL_SERVER_ERROR, "model crashed");
        assert!(matches!(err, AppError::Llm(ref m) if m.contains("model crashed")));
    }
}
