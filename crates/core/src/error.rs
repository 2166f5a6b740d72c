//! Error types for CRAG.
//!
//! This module defines a unified error enum that covers all error categories
//! in the workspace: configuration, I/O, LLM and search providers,
//! credentials, the knowledge corpus, prompts and run cancellation.

use thiserror::Error;

/// Unified error type for CRAG.
///
/// All library functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing credentials, unknown providers)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (transport, malformed output)
    #[error("LLM error: {0}")]
    Llm(String),

    /// The provider rejected the supplied credentials
    #[error("Authentication failed for provider '{provider}': {message}")]
    Auth { provider: String, message: String },

    /// Knowledge base and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Web search provider errors
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller abandoned the operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build an authentication error for a provider.
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Auth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the credentials themselves are wrong.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
