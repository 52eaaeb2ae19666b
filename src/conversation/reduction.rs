//! Conversation reduction
//!
//! Keeps the in-memory history bounded by retaining only the most recent
//! user/assistant pairs. The system turn is always kept and is not counted
//! against the target.
//!
//! Dropping always happens on pair boundaries, so a reduced history is
//! itself a valid at-rest history. Reduction is a pure function of its
//! inputs: the reducer holds no state and performs no I/O, which lets the
//! session call it after every completed exchange.

use super::history::{ConversationHistory, HistoryError, Role, Turn};

/// Default number of pairs kept after each exchange
pub const DEFAULT_TARGET_PAIR_COUNT: usize = 2;

/// Configuration for history reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionPolicy {
    /// Number of most recent user/assistant pairs to retain.
    /// Zero keeps only the system turn.
    pub target_pair_count: usize,
}

impl ReductionPolicy {
    pub fn new(target_pair_count: usize) -> Self {
        Self { target_pair_count }
    }
}

impl Default for ReductionPolicy {
    fn default() -> Self {
        Self {
            target_pair_count: DEFAULT_TARGET_PAIR_COUNT,
        }
    }
}

/// Result of a reduction
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedHistory {
    /// The retained turns, ready for [`ConversationHistory::replace`]
    pub turns: Vec<Turn>,

    /// Number of whole pairs that were dropped
    pub dropped_pairs: usize,
}

impl ReducedHistory {
    /// True when the input was already within budget
    pub fn is_noop(&self) -> bool {
        self.dropped_pairs == 0
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

/// Stateless pair-retention reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryReducer;

impl HistoryReducer {
    pub fn new() -> Self {
        Self
    }

    /// Reduce `history` to at most `target_pair_count` pairs.
    ///
    /// Fails with [`HistoryError::NotAtRest`] if a user turn is still
    /// awaiting its reply.
    pub fn reduce(
        &self,
        history: &ConversationHistory,
        target_pair_count: usize,
    ) -> Result<ReducedHistory, HistoryError> {
        if !history.is_at_rest() {
            return Err(HistoryError::NotAtRest);
        }

        let turns: Vec<&Turn> = history.turns().collect();
        let body_start = match turns.first() {
            Some(first) if first.role() == Role::System => 1,
            _ => 0,
        };

        // At rest the body is a whole number of (user, assistant) pairs
        let pair_count = (turns.len() - body_start) / 2;
        if pair_count <= target_pair_count {
            return Ok(ReducedHistory {
                turns: turns.into_iter().cloned().collect(),
                dropped_pairs: 0,
            });
        }

        let dropped_pairs = pair_count - target_pair_count;
        let keep_from = body_start + dropped_pairs * 2;

        let reduced = turns[..body_start]
            .iter()
            .chain(turns[keep_from..].iter())
            .map(|turn| (*turn).clone())
            .collect();

        Ok(ReducedHistory {
            turns: reduced,
            dropped_pairs,
        })
    }

    /// Reduce using the target from a [`ReductionPolicy`]
    pub fn apply(
        &self,
        history: &ConversationHistory,
        policy: &ReductionPolicy,
    ) -> Result<ReducedHistory, HistoryError> {
        self.reduce(history, policy.target_pair_count)
    }
}
