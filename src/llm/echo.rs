//! Echo provider
//!
//! Offline backend that never calls a remote API. It answers with the
//! last user turn, which makes it handy for trying the CLI without
//! credentials and for driving sessions in tests.

use crate::conversation::{Role, Turn};
use crate::llm::{Backend, GenerationSettings, LlmError, LlmResponse, TokenUsage};
use async_trait::async_trait;

/// Rough character-per-token ratio used for the estimated usage
const CHARS_PER_TOKEN: usize = 4;

fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

pub struct EchoBackend {
    model_name: String,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self {
            model_name: "echo".to_string(),
        }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for EchoBackend {
    async fn complete(
        &self,
        turns: &[Turn],
        settings: &GenerationSettings,
    ) -> Result<LlmResponse, LlmError> {
        let last_user = turns
            .iter()
            .rev()
            .find(|turn| turn.role() == Role::User)
            .ok_or_else(|| LlmError::ApiError("No user turn to echo".to_string()))?;

        let mut content = last_user.content().to_string();
        if let Some(limit) = settings.max_tokens {
            let max_chars = limit as usize * CHARS_PER_TOKEN;
            let cut = content.char_indices().nth(max_chars).map(|(index, _)| index);
            if let Some(cut) = cut {
                content.truncate(cut);
            }
        }

        let has_system_turn = turns.iter().any(|turn| turn.role() == Role::System);
        let system_tokens = match settings.system_prompt.as_deref() {
            Some(prompt) if !has_system_turn => estimate_tokens(prompt),
            _ => 0,
        };
        let prompt_tokens = system_tokens
            + turns
                .iter()
                .map(|turn| estimate_tokens(turn.content()))
                .sum::<u64>();
        let completion_tokens = estimate_tokens(&content);

        Ok(LlmResponse {
            content,
            usage: Some(TokenUsage::new(
                prompt_tokens,
                completion_tokens,
                prompt_tokens + completion_tokens,
            )),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}
