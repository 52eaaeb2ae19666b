//! Chat session
//!
//! A session owns the single conversation history of the process and runs
//! one exchange at a time: append the prompt, ask the backend, append the
//! reply, record usage, then reduce the history and swap the reduced turns
//! back in.

use crate::conversation::{
    ConversationHistory, HistoryError, HistoryReducer, ReductionPolicy, Turn,
};
use crate::llm::{Backend, GenerationSettings, LlmError, TokenUsage};
use tracing::{debug, info, warn};

/// Errors from a single exchange
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Completion(#[from] LlmError),
}

/// Running token totals across the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    /// Completed exchanges
    pub exchanges: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Exchanges whose provider reported no usage
    pub unreported: u64,
}

impl UsageTotals {
    pub fn record(&mut self, usage: Option<&TokenUsage>) {
        self.exchanges = self.exchanges.saturating_add(1);
        match usage {
            Some(usage) => {
                self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
                self.completion_tokens =
                    self.completion_tokens.saturating_add(usage.completion_tokens);
                self.total_tokens = self.total_tokens.saturating_add(usage.total_tokens);
            }
            None => self.unreported = self.unreported.saturating_add(1),
        }
    }
}

/// What one completed exchange produced
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    pub reply: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    /// Pairs dropped by the reduction that followed the exchange
    pub dropped_pairs: usize,
}

pub struct ChatSession {
    backend: Box<dyn Backend>,
    history: ConversationHistory,
    settings: GenerationSettings,
    policy: ReductionPolicy,
    reducer: HistoryReducer,
    totals: UsageTotals,
}

impl ChatSession {
    /// Start a session. The settings' system prompt becomes the history's
    /// system turn.
    pub fn new(
        backend: Box<dyn Backend>,
        settings: GenerationSettings,
        policy: ReductionPolicy,
    ) -> Self {
        let history = match settings.system_prompt.as_deref() {
            Some(directive) => ConversationHistory::with_system(directive),
            None => ConversationHistory::new(),
        };

        Self {
            backend,
            history,
            settings,
            policy,
            reducer: HistoryReducer::new(),
            totals: UsageTotals::default(),
        }
    }

    /// Run one exchange.
    ///
    /// If the backend fails, the error is returned unchanged and the
    /// history is left with the prompt pending; call
    /// [`ChatSession::abandon_pending`] before the next exchange.
    pub async fn exchange(&mut self, prompt: &str) -> Result<ExchangeOutcome, SessionError> {
        self.history.append_user(prompt)?;

        let response = self
            .backend
            .complete(self.history.turns().as_slice(), &self.settings)
            .await?;

        if let Some(usage) = &response.usage {
            if !usage.is_consistent() {
                warn!(
                    "{} reported total_tokens {} but prompt {} + completion {} = {}",
                    self.backend.name(),
                    usage.total_tokens,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    usage.prompt_tokens.saturating_add(usage.completion_tokens)
                );
            }
        } else {
            debug!("{} returned no usage for this exchange", self.backend.name());
        }

        self.history
            .append_assistant(response.content.clone(), response.usage)?;
        self.totals.record(response.usage.as_ref());
        if let Some(usage) = &response.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "exchange completed"
            );
        }

        let reduced = self.reducer.apply(&self.history, &self.policy)?;
        let dropped_pairs = reduced.dropped_pairs;
        if !reduced.is_noop() {
            debug!(
                "Dropped {} oldest exchange(s), keeping {}",
                dropped_pairs, self.policy.target_pair_count
            );
            self.history.replace(reduced.into_turns())?;
        }

        Ok(ExchangeOutcome {
            reply: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
            dropped_pairs,
        })
    }

    /// Drop a prompt left pending by a failed exchange
    pub fn abandon_pending(&mut self) -> Option<Turn> {
        self.history.abandon_pending()
    }

    /// Forget all exchanges, keeping the system turn
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn totals(&self) -> &UsageTotals {
        &self.totals
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}
