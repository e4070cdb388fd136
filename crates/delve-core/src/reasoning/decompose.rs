//! Task decomposition with a bounded re-decomposition loop.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::context::ResearchContext;
use crate::core::events::ReasoningEvent;
use crate::core::sink::EventSink;
use crate::prompts::{self, DecomposeVars};
use crate::providers::{GenerationParams, ModelGateway};

use super::error::{ReasoningError, ReasoningResult};

/// Re-decomposition attempts after the first request.
pub const MAX_DECOMPOSITION_RETRIES: usize = 2;

/// A proposal is oversized when it exceeds this multiple of the ceiling.
pub const OVERSIZE_FACTOR: f64 = 1.5;

/// One list marker: `1.`, `2)` or a bullet followed by whitespace.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+[.)]|[-*•](?:\s|$))\s*").expect("valid regex")
});

/// Extracts subtasks from an enumerated model response.
///
/// Only lines starting with a number or a bullet (`-`, `*`, `•`) count.
/// Exactly one marker is stripped, so Markdown emphasis in the item survives.
pub fn parse_subtasks(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let marker = LIST_MARKER.find(line)?;
            let subtask = line[marker.end()..].trim();
            (!subtask.is_empty()).then(|| subtask.to_string())
        })
        .collect()
}

/// Returns true when `count` is more than 1.5 times `step_ceiling`.
pub fn is_oversized(count: usize, step_ceiling: usize) -> bool {
    count as f64 > step_ceiling as f64 * OVERSIZE_FACTOR
}

enum DecompositionState {
    Requesting {
        retry: usize,
        previous_count: Option<usize>,
    },
    Done(Vec<String>),
}

/// Splits a task into an ordered list of subtasks.
pub struct TaskDecomposer<'a> {
    gateway: &'a dyn ModelGateway,
    sink: &'a EventSink,
    params: GenerationParams,
}

impl<'a> TaskDecomposer<'a> {
    pub fn new(gateway: &'a dyn ModelGateway, sink: &'a EventSink, params: GenerationParams) -> Self {
        Self {
            gateway,
            sink,
            params,
        }
    }

    /// Decomposes `task` into at most roughly `step_ceiling` subtasks.
    ///
    /// Oversized or empty proposals are retried up to
    /// `MAX_DECOMPOSITION_RETRIES` times. An oversized list that survives the
    /// retries is accepted as is.
    ///
    /// # Errors
    /// Fails if a model call fails, or if no subtask could be parsed after
    /// the last retry.
    pub async fn decompose(
        &self,
        task: &str,
        context: &ResearchContext,
        step_ceiling: usize,
    ) -> ReasoningResult<Vec<String>> {
        self.sink
            .publish(ReasoningEvent::decomposition_start(task, step_ceiling));
        let rendered_context = context.render();

        let mut state = DecompositionState::Requesting {
            retry: 0,
            previous_count: None,
        };
        loop {
            state = match state {
                DecompositionState::Requesting {
                    retry,
                    previous_count,
                } => {
                    let prompt = prompts::decompose(&DecomposeVars {
                        task,
                        context: rendered_context.as_deref(),
                        max_steps: step_ceiling,
                        previous_count,
                    })?;
                    let response = self.gateway.generate(&prompt, self.params).await?;
                    let subtasks = parse_subtasks(&response);
                    let count = subtasks.len();
                    tracing::debug!(retry, count, step_ceiling, "decomposition proposal");

                    let acceptable = count > 0 && !is_oversized(count, step_ceiling);
                    if acceptable || retry >= MAX_DECOMPOSITION_RETRIES {
                        if count == 0 {
                            return Err(ReasoningError::Decomposition(format!(
                                "no subtasks could be parsed after {} attempts",
                                retry + 1
                            )));
                        }
                        if !acceptable {
                            tracing::warn!(
                                count,
                                step_ceiling,
                                "accepting oversized decomposition"
                            );
                        }
                        DecompositionState::Done(subtasks)
                    } else {
                        self.sink.publish(ReasoningEvent::decomposition_retry(
                            retry + 1,
                            count,
                            step_ceiling,
                        ));
                        DecompositionState::Requesting {
                            retry: retry + 1,
                            previous_count: (count > 0).then_some(count),
                        }
                    }
                }
                DecompositionState::Done(subtasks) => {
                    self.sink
                        .publish(ReasoningEvent::decomposition_complete(&subtasks));
                    return Ok(subtasks);
                }
            };
        }
    }
}
