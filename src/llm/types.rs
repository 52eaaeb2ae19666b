//! Common types for LLM interactions
//!
//! These types are shared by every backend to describe generation
//! settings, responses, and token accounting.

use serde::{Deserialize, Serialize};

/// Response from an LLM provider
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// The generated assistant text
    pub content: String,

    /// Usage statistics, if the provider reported them
    pub usage: Option<TokenUsage>,

    /// The reason the response was stopped (e.g., "stop", "length")
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a single exchange
///
/// `total_tokens` is taken from the provider as-is. It is expected to be the
/// sum of the other two fields but nothing here enforces that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the request (history plus system prompt)
    pub prompt_tokens: u64,

    /// Tokens generated in the reply
    pub completion_tokens: u64,

    /// Total tokens billed for the exchange
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Whether the provider's total matches prompt + completion
    pub fn is_consistent(&self) -> bool {
        self.prompt_tokens.checked_add(self.completion_tokens) == Some(self.total_tokens)
    }
}

/// Generation settings forwarded verbatim to the completion backend
///
/// None of these are interpreted by the conversation core. Backends map
/// them onto their own request fields and omit the ones left as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Persona prompt used when the history carries no system turn
    pub system_prompt: Option<String>,

    /// Cap on generated tokens
    pub max_tokens: Option<u32>,

    /// Sampling randomness, 0.0 to 2.0
    pub temperature: Option<f32>,

    /// Nucleus sampling mass, 0.0 to 1.0
    pub top_p: Option<f32>,

    pub frequency_penalty: Option<f32>,

    pub presence_penalty: Option<f32>,
}
