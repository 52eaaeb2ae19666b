//! Conversation management
//!
//! This module handles the conversation-history lifecycle:
//! - Appending turns while keeping user/assistant alternation intact
//! - Reducing the history to a bounded number of recent exchanges
//! - Console display of replies and token usage

mod history;
mod reduction;

pub use history::{ConversationHistory, HistoryError, Role, Turn, Turns};
pub use reduction::{HistoryReducer, ReducedHistory, ReductionPolicy, DEFAULT_TARGET_PAIR_COUNT};

use crate::constants::{FORMAT_BOLD, FORMAT_GRAY, FORMAT_RESET};
use crate::llm::TokenUsage;

/// Print the assistant's reply to stdout
pub fn print_assistant_response(text: &str) {
    println!("{}", text);
}

/// Format the per-exchange token usage line
pub fn format_token_stats(usage: Option<&TokenUsage>) -> String {
    match usage {
        Some(usage) => format!(
            "Tokens Used: Prompt - {}, Output - {}, Total - {}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        ),
        None => "Tokens Used: not reported by provider".to_string(),
    }
}

/// Print token usage statistics to stdout
pub fn print_token_stats(usage: Option<&TokenUsage>) {
    println!(
        "\n{}{}{}{}",
        FORMAT_GRAY,
        FORMAT_BOLD,
        format_token_stats(usage),
        FORMAT_RESET
    );
}
