//! Reasoning event types.
//!
//! Events are the only outward signal of a running session. The engine never
//! prints; renderers subscribe to the session's `EventSink` and decide how to
//! display each event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of an `Error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Decomposition never produced a usable subtask list.
    Decomposition,
    /// The aggregation model call failed.
    Aggregation,
    /// A model call outside subtask execution failed, ending the session.
    Provider,
    /// Web search failed; the subtask continues without it.
    Search,
    /// Content extraction failed for one URL; the subtask continues.
    Extraction,
    /// The session was cancelled before finishing.
    Cancelled,
    /// A prompt template failed to render, or the session task died.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Decomposition => write!(f, "decomposition"),
            ErrorKind::Aggregation => write!(f, "aggregation"),
            ErrorKind::Provider => write!(f, "provider"),
            ErrorKind::Search => write!(f, "search"),
            ErrorKind::Extraction => write!(f, "extraction"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Kind-specific payload of a reasoning event.
///
/// Serialized with a `type` tag so JSON consumers can dispatch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Decomposition is about to issue its first model call.
    DecompositionStart { task: String, step_ceiling: usize },
    /// The proposed subtask count was over the threshold (or empty); asking again.
    DecompositionRetry {
        /// Retry number, starting at 1.
        attempt: usize,
        /// Number of subtasks the previous attempt proposed.
        proposed: usize,
        step_ceiling: usize,
    },
    /// The accepted, ordered subtask list.
    DecompositionComplete { subtasks: Vec<String> },
    /// A subtask began executing.
    SubtaskStart {
        index: usize,
        total: usize,
        subtask: String,
    },
    /// A subtask is being executed again after an incomplete verdict.
    SubtaskRetry {
        index: usize,
        /// Attempt about to run, starting at 2.
        attempt: usize,
        max_retries: usize,
    },
    /// The first completion check for a subtask started.
    SubtaskValidationStart { index: usize },
    /// The subtask response was judged complete.
    SubtaskComplete {
        index: usize,
        attempts: usize,
        response: String,
    },
    /// An attempt was judged incomplete (or its model call failed).
    SubtaskIncomplete {
        index: usize,
        attempt: usize,
        reason: String,
    },
    /// The retry budget is spent; the last response is kept.
    SubtaskMaxRetries {
        index: usize,
        attempts: usize,
        response: String,
    },
    /// Aggregation is about to issue its model call.
    AggregationStart {
        subtask_count: usize,
        incomplete_count: usize,
    },
    /// The final synthesized answer.
    AggregationComplete { answer: String },
    /// Something went wrong. Non-fatal errors do not stop the run.
    Error { kind: ErrorKind, fatal: bool },
    /// The session deadline passed.
    Timeout {
        elapsed_secs: u64,
        completed_subtasks: usize,
    },
}

impl EventKind {
    /// Returns the serialized tag for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DecompositionStart { .. } => "decomposition_start",
            EventKind::DecompositionRetry { .. } => "decomposition_retry",
            EventKind::DecompositionComplete { .. } => "decomposition_complete",
            EventKind::SubtaskStart { .. } => "subtask_start",
            EventKind::SubtaskRetry { .. } => "subtask_retry",
            EventKind::SubtaskValidationStart { .. } => "subtask_validation_start",
            EventKind::SubtaskComplete { .. } => "subtask_complete",
            EventKind::SubtaskIncomplete { .. } => "subtask_incomplete",
            EventKind::SubtaskMaxRetries { .. } => "subtask_max_retries",
            EventKind::AggregationStart { .. } => "aggregation_start",
            EventKind::AggregationComplete { .. } => "aggregation_complete",
            EventKind::Error { .. } => "error",
            EventKind::Timeout { .. } => "timeout",
        }
    }
}

/// A timestamped progress event with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ReasoningEvent {
    /// Creates an event stamped with the current time.
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn decomposition_start(task: &str, step_ceiling: usize) -> Self {
        Self::new(
            EventKind::DecompositionStart {
                task: task.to_string(),
                step_ceiling,
            },
            "Breaking the task down into subtasks",
        )
    }

    pub fn decomposition_retry(attempt: usize, proposed: usize, step_ceiling: usize) -> Self {
        let message = if proposed == 0 {
            format!("No subtasks could be parsed, asking again (retry {attempt})")
        } else {
            format!(
                "Got {proposed} subtasks for a ceiling of {step_ceiling}, asking for fewer (retry {attempt})"
            )
        };
        Self::new(
            EventKind::DecompositionRetry {
                attempt,
                proposed,
                step_ceiling,
            },
            message,
        )
    }

    pub fn decomposition_complete(subtasks: &[String]) -> Self {
        Self::new(
            EventKind::DecompositionComplete {
                subtasks: subtasks.to_vec(),
            },
            format!("Task broken down into {} subtasks", subtasks.len()),
        )
    }

    pub fn subtask_start(index: usize, total: usize, subtask: &str) -> Self {
        Self::new(
            EventKind::SubtaskStart {
                index,
                total,
                subtask: subtask.to_string(),
            },
            format!("Executing subtask {}/{total}: {subtask}", index + 1),
        )
    }

    pub fn subtask_retry(index: usize, attempt: usize, max_retries: usize) -> Self {
        Self::new(
            EventKind::SubtaskRetry {
                index,
                attempt,
                max_retries,
            },
            format!(
                "Retrying subtask {} (retry {}/{max_retries})",
                index + 1,
                attempt - 1
            ),
        )
    }

    pub fn subtask_validation_start(index: usize) -> Self {
        Self::new(
            EventKind::SubtaskValidationStart { index },
            format!("Checking whether subtask {} is complete", index + 1),
        )
    }

    pub fn subtask_complete(index: usize, attempts: usize, response: &str) -> Self {
        Self::new(
            EventKind::SubtaskComplete {
                index,
                attempts,
                response: response.to_string(),
            },
            format!("Subtask {} complete", index + 1),
        )
    }

    pub fn subtask_incomplete(index: usize, attempt: usize, reason: &str) -> Self {
        Self::new(
            EventKind::SubtaskIncomplete {
                index,
                attempt,
                reason: reason.to_string(),
            },
            format!("Subtask {} incomplete: {reason}", index + 1),
        )
    }

    pub fn subtask_max_retries(index: usize, attempts: usize, response: &str) -> Self {
        Self::new(
            EventKind::SubtaskMaxRetries {
                index,
                attempts,
                response: response.to_string(),
            },
            format!(
                "Subtask {} still incomplete after {attempts} attempts, keeping the last response",
                index + 1
            ),
        )
    }

    pub fn aggregation_start(subtask_count: usize, incomplete_count: usize) -> Self {
        Self::new(
            EventKind::AggregationStart {
                subtask_count,
                incomplete_count,
            },
            format!("Aggregating results from {subtask_count} subtasks"),
        )
    }

    pub fn aggregation_complete(answer: &str) -> Self {
        Self::new(
            EventKind::AggregationComplete {
                answer: answer.to_string(),
            },
            "Final answer ready",
        )
    }

    pub fn error(kind: ErrorKind, fatal: bool, message: impl Into<String>) -> Self {
        Self::new(EventKind::Error { kind, fatal }, message)
    }

    pub fn cancelled(completed_subtasks: usize) -> Self {
        Self::error(
            ErrorKind::Cancelled,
            true,
            format!("Session cancelled after {completed_subtasks} subtasks"),
        )
    }

    pub fn timeout(elapsed_secs: u64, completed_subtasks: usize) -> Self {
        Self::new(
            EventKind::Timeout {
                elapsed_secs,
                completed_subtasks,
            },
            format!("Session timed out after {elapsed_secs}s ({completed_subtasks} subtasks done)"),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag_and_message() {
        let event = ReasoningEvent::subtask_start(0, 3, "Collect data");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "subtask_start");
        assert_eq!(value["index"], 0);
        assert_eq!(value["total"], 3);
        assert_eq!(value["subtask"], "Collect data");
        assert_eq!(value["message"], "Executing subtask 1/3: Collect data");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_event_deserializes_from_json() {
        let value = json!({
            "timestamp": "2025-01-01T00:00:00Z",
            "message": "boom",
            "type": "error",
            "kind": "search",
            "fatal": false
        });
        let event: ReasoningEvent = serde_json::from_value(value).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Error {
                kind: ErrorKind::Search,
                fatal: false
            }
        );
        assert_eq!(event.message, "boom");
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let events = [
            ReasoningEvent::decomposition_start("t", 3),
            ReasoningEvent::decomposition_retry(1, 9, 3),
            ReasoningEvent::decomposition_complete(&["a".to_string()]),
            ReasoningEvent::subtask_retry(0, 2, 3),
            ReasoningEvent::subtask_validation_start(0),
            ReasoningEvent::subtask_complete(0, 1, "r"),
            ReasoningEvent::subtask_incomplete(0, 1, "missing"),
            ReasoningEvent::subtask_max_retries(0, 4, "r"),
            ReasoningEvent::aggregation_start(3, 1),
            ReasoningEvent::aggregation_complete("done"),
            ReasoningEvent::cancelled(1),
            ReasoningEvent::timeout(10, 2),
        ];
        for event in events {
            let value: Value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.name());
        }
    }

    #[test]
    fn test_retry_message_counts_retries_not_attempts() {
        let event = ReasoningEvent::subtask_retry(1, 2, 3);
        assert_eq!(event.message, "Retrying subtask 2 (retry 1/3)");
    }
}
