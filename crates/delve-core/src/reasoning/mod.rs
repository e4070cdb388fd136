//! Reasoning orchestration engine.
//!
//! A [`ReasoningSession`] decomposes a task into subtasks, executes each with
//! model-driven validation and bounded retry, and aggregates the results,
//! publishing a [`ReasoningEvent`](crate::core::events::ReasoningEvent) at
//! every transition.

pub mod aggregate;
pub mod chain;
pub mod decompose;
pub mod enrich;
pub mod error;
pub mod execute;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::ResultAggregator;
pub use chain::{ChainOfThought, DEFAULT_DOCUMENT_QUESTION, chain_of_thought};
pub use decompose::TaskDecomposer;
pub use enrich::Enricher;
pub use error::{ReasoningError, ReasoningResult};
pub use execute::{SubtaskExecutor, SubtaskRequest, SubtaskResult};
pub use session::{
    ReasoningSession, SessionHandle, SessionOptions, SessionOutcome, SessionStatus,
};
pub use store::SessionStore;
