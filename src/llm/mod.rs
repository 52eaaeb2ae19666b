//! LLM provider abstraction layer
//!
//! This module defines the completion contract the chat session talks to
//! and the backends implementing it (OpenAI, Azure OpenAI, offline echo).

pub use async_trait::async_trait;

pub mod echo;
pub mod factory;
pub mod openai;
pub mod retry_utils;
mod types;

pub use self::factory::{create_backend, parse_model_string, ModelInfo, Provider};
pub use self::types::*;

use crate::conversation::Turn;

/// Common trait for all LLM backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send the conversation to the model and return its reply
    ///
    /// `turns` is the current history, passed verbatim. `settings` are
    /// forwarded to the provider without interpretation.
    async fn complete(
        &self,
        turns: &[Turn],
        settings: &GenerationSettings,
    ) -> Result<LlmResponse, LlmError>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;
}

/// Error types for LLM operations
#[derive(Debug)]
pub enum LlmError {
    /// API request error
    ApiError(String),

    /// Configuration error
    ConfigError(String),

    /// Rate limit error
    RateLimitError { retry_after: Option<u64> },

    /// Generic error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiError(msg) => write!(f, "API error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::RateLimitError { retry_after } => {
                if let Some(seconds) = retry_after {
                    write!(f, "Rate limit exceeded. Retry after {} seconds", seconds)
                } else {
                    write!(f, "Rate limit exceeded")
                }
            }
            Self::Other(err) => write!(f, "LLM error: {}", err),
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
