use thiserror::Error;

use crate::core::events::ErrorKind;
use crate::providers::ProviderError;

pub type ReasoningResult<T, E = ReasoningError> = Result<T, E>;

/// Fatal failures of a reasoning run.
///
/// Subtask failures are never errors; they surface as `completed = false`
/// results. Cancellation and timeouts after decomposition are reported
/// through `SessionOutcome` instead.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("task decomposition failed: {0}")]
    Decomposition(String),

    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("aggregation failed: {0}")]
    Aggregation(#[source] ProviderError),

    #[error("session timed out after {elapsed_secs}s before decomposition completed")]
    Timeout { elapsed_secs: u64 },

    #[error("failed to render prompt: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("session task stopped unexpectedly: {0}")]
    Aborted(String),
}

impl ReasoningError {
    /// Category of the fatal `error` event published for this failure.
    pub fn event_kind(&self) -> ErrorKind {
        match self {
            ReasoningError::Decomposition(_) => ErrorKind::Decomposition,
            ReasoningError::Provider(_) => ErrorKind::Provider,
            ReasoningError::Aggregation(_) => ErrorKind::Aggregation,
            ReasoningError::Timeout { .. }
            | ReasoningError::Prompt(_)
            | ReasoningError::Aborted(_) => ErrorKind::Internal,
        }
    }
}
