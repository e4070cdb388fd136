//! Two-call chain-of-thought: reason first, then answer from the reasoning.

use serde::Serialize;

use super::error::ReasoningResult;
use crate::core::context::ResearchContext;
use crate::prompts::{self, ChainAnswerVars, ChainOfThoughtVars};
use crate::providers::{GenerationParams, ModelGateway};

/// Question used when documents are supplied without one.
pub const DEFAULT_DOCUMENT_QUESTION: &str = "What are the key insights from these documents?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOfThought {
    pub reasoning: String,
    pub answer: String,
}

/// Answers `question` through an explicit reasoning step.
///
/// # Errors
/// Fails if either model call fails.
pub async fn chain_of_thought(
    gateway: &dyn ModelGateway,
    question: &str,
    context: &ResearchContext,
    params: GenerationParams,
) -> ReasoningResult<ChainOfThought> {
    let rendered_context = context.render();
    let prompt = prompts::chain_of_thought(&ChainOfThoughtVars {
        question,
        context: rendered_context.as_deref(),
    })?;
    let reasoning = gateway.generate(&prompt, params).await?;
    tracing::debug!(chars = reasoning.len(), "chain-of-thought reasoning done");

    let prompt = prompts::chain_answer(&ChainAnswerVars {
        question,
        reasoning: &reasoning,
    })?;
    let answer = gateway.generate(&prompt, params).await?;

    Ok(ChainOfThought { reasoning, answer })
}
