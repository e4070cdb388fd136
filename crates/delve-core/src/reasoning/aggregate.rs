use super::error::{ReasoningError, ReasoningResult};
use super::execute::SubtaskResult;
use crate::core::events::ReasoningEvent;
use crate::core::sink::EventSink;
use crate::prompts::{self, AggregateVars, PriorResult};
use crate::providers::{GenerationParams, ModelGateway};

/// Synthesizes subtask results into one answer.
pub struct ResultAggregator<'a> {
    gateway: &'a dyn ModelGateway,
    sink: &'a EventSink,
    params: GenerationParams,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(gateway: &'a dyn ModelGateway, sink: &'a EventSink, params: GenerationParams) -> Self {
        Self {
            gateway,
            sink,
            params,
        }
    }

    /// Builds the final answer from every subtask and its result.
    ///
    /// Incomplete results are included and marked as partial.
    ///
    /// # Errors
    /// Fails only when the model call fails.
    pub async fn aggregate(
        &self,
        task: &str,
        subtasks: &[String],
        results: &[SubtaskResult],
    ) -> ReasoningResult<String> {
        let incomplete = results.iter().filter(|r| !r.completed).count();
        self.sink
            .publish(ReasoningEvent::aggregation_start(subtasks.len(), incomplete));

        let pairs = subtasks
            .iter()
            .zip(results)
            .enumerate()
            .map(|(i, (subtask, result))| PriorResult {
                index: i + 1,
                subtask,
                response: &result.response,
                completed: result.completed,
            })
            .collect();
        let prompt = prompts::aggregate(&AggregateVars {
            task,
            results: pairs,
        })?;

        let answer = self
            .gateway
            .generate(&prompt, self.params)
            .await
            .map_err(ReasoningError::Aggregation)?;

        self.sink
            .publish(ReasoningEvent::aggregation_complete(&answer));
        Ok(answer)
    }
}

/// Joins finished results without a model call.
///
/// Used when the session deadline passes before aggregation.
pub fn assemble_partial(task: &str, results: &[SubtaskResult]) -> String {
    let mut answer = format!(
        "Partial results for: {task}\n\n(The session timed out after {} subtasks; these results were not aggregated.)",
        results.len()
    );
    for result in results {
        answer.push_str(&format!(
            "\n\n## Subtask {}: {}\n\n{}",
            result.index + 1,
            result.subtask,
            result.response.trim()
        ));
        if !result.completed {
            answer.push_str("\n\n(incomplete)");
        }
    }
    answer
}
