//! Conversation history
//!
//! The history is an ordered log of turns: an optional system turn in
//! first position, followed by strictly alternating user/assistant turns.
//! A history is "at rest" when no user turn is waiting for its reply.
//! Every mutation checks those rules before touching the log, so a
//! rejected call never leaves a half-applied change behind.

use crate::llm::TokenUsage;
use std::fmt;

/// The speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single utterance in the conversation
///
/// Turns are immutable once created; the fields are only readable.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    content: String,
    usage: Option<TokenUsage>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            usage: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            usage: None,
        }
    }

    pub fn assistant(content: impl Into<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            usage,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Usage reported for this turn; only assistant turns carry one
    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }
}

/// Contract violations raised by the history and the reducer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// An append would break user/assistant alternation
    #[error("out-of-sequence turn: expected {expected}, got {found}")]
    Sequence { expected: Role, found: Role },

    /// The history has a user turn still waiting for its reply
    #[error("history is not at rest: a user turn is awaiting its reply")]
    NotAtRest,

    /// A replacement sequence does not describe an at-rest history
    #[error("invalid history: {0}")]
    InvalidHistory(String),
}

/// Read-only, restartable view over the turns of a history
pub type Turns<'a> = std::slice::Iter<'a, Turn>;

/// Ordered log of conversation turns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// Create an empty history with no system directive
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Create a history whose first turn is the given system directive
    pub fn with_system(directive: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(directive)],
        }
    }

    /// Append a user turn. The history must be at rest.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), HistoryError> {
        if !self.is_at_rest() {
            return Err(HistoryError::Sequence {
                expected: Role::Assistant,
                found: Role::User,
            });
        }
        self.turns.push(Turn::user(text));
        Ok(())
    }

    /// Append the assistant reply to the pending user turn
    pub fn append_assistant(
        &mut self,
        text: impl Into<String>,
        usage: Option<TokenUsage>,
    ) -> Result<(), HistoryError> {
        if self.last_turn().map(Turn::role) != Some(Role::User) {
            return Err(HistoryError::Sequence {
                expected: Role::User,
                found: Role::Assistant,
            });
        }
        self.turns.push(Turn::assistant(text, usage));
        Ok(())
    }

    /// Iterate over the turns in chronological order
    pub fn turns(&self) -> Turns<'_> {
        self.turns.iter()
    }

    /// Replace the whole turn sequence.
    ///
    /// `new_turns` must describe an at-rest history. On error the current
    /// turns are kept.
    pub fn replace(&mut self, new_turns: Vec<Turn>) -> Result<(), HistoryError> {
        validate_at_rest(&new_turns)?;
        self.turns = new_turns;
        Ok(())
    }

    /// Drop the dangling user turn left behind by a failed request.
    ///
    /// Returns the removed turn, or `None` if the history was already at
    /// rest. Completed pairs are never touched.
    pub fn abandon_pending(&mut self) -> Option<Turn> {
        if self.is_at_rest() {
            return None;
        }
        self.turns.pop()
    }

    /// Remove every exchange, keeping the system directive
    pub fn clear(&mut self) {
        self.turns.retain(|turn| turn.role() == Role::System);
    }

    /// The system directive, if the history has one
    pub fn system(&self) -> Option<&Turn> {
        self.turns.first().filter(|turn| turn.role() == Role::System)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// True unless the last turn is a user turn awaiting its reply
    pub fn is_at_rest(&self) -> bool {
        self.last_turn().map(Turn::role) != Some(Role::User)
    }

    /// Number of completed user/assistant pairs
    pub fn pair_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|turn| turn.role() == Role::Assistant)
            .count()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Check that `turns` is a well-formed at-rest history
pub(crate) fn validate_at_rest(turns: &[Turn]) -> Result<(), HistoryError> {
    let body = match turns.first() {
        Some(first) if first.role() == Role::System => &turns[1..],
        _ => turns,
    };

    for (offset, turn) in body.iter().enumerate() {
        let expected = if offset % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        };
        if turn.role() != expected {
            let position = offset + (turns.len() - body.len());
            return Err(HistoryError::InvalidHistory(format!(
                "turn {} is {}, expected {}",
                position,
                turn.role(),
                expected
            )));
        }
    }

    if body.len() % 2 != 0 {
        return Err(HistoryError::InvalidHistory(
            "history ends on a user turn".to_string(),
        ));
    }

    Ok(())
}
