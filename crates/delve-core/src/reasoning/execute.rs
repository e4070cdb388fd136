//! Subtask execution with model-driven validation and bounded retry.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::enrich::Enricher;
use crate::core::context::ResearchContext;
use crate::core::events::ReasoningEvent;
use crate::core::sink::EventSink;
use crate::prompts::{self, ExecuteVars, PriorResult, ValidateVars};
use crate::providers::{GenerationParams, ModelGateway};

/// Outcome of one subtask. Always produced, even when retries run out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskResult {
    /// 0-based position in the subtask list.
    pub index: usize,
    pub subtask: String,
    /// Last response produced; empty if every model call failed.
    pub response: String,
    pub attempts: usize,
    pub completed: bool,
}

impl SubtaskResult {
    pub(crate) fn as_prior(&self) -> PriorResult<'_> {
        PriorResult {
            index: self.index + 1,
            subtask: &self.subtask,
            response: &self.response,
            completed: self.completed,
        }
    }
}

/// Completion verdict parsed from a validation reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Complete,
    Incomplete(String),
}

/// Parses a validation reply.
///
/// A reply whose first word is `INCOMPLETE` or `NO` is incomplete; anything
/// else, including an unrecognised answer, counts as complete.
pub fn parse_verdict(reply: &str) -> Verdict {
    let trimmed = reply.trim_start_matches(|c: char| !c.is_alphanumeric());
    let word_end = trimmed
        .find(|c: char| !c.is_alphabetic())
        .unwrap_or(trimmed.len());
    let (word, rest) = trimmed.split_at(word_end);

    match word.to_ascii_uppercase().as_str() {
        "INCOMPLETE" | "NO" => {
            let reason = rest
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '.' | ','))
                .trim();
            if reason.is_empty() {
                Verdict::Incomplete("the response does not complete the subtask".to_string())
            } else {
                Verdict::Incomplete(reason.to_string())
            }
        }
        _ => Verdict::Complete,
    }
}

/// Everything the executor needs to run one subtask.
pub struct SubtaskRequest<'a> {
    pub task: &'a str,
    pub subtask: &'a str,
    pub index: usize,
    pub total: usize,
    pub context: &'a ResearchContext,
    /// Results of the subtasks before this one, in order.
    pub previous: &'a [SubtaskResult],
}

/// Explicit per-subtask state machine. `attempt` is 1-based.
#[derive(Debug)]
enum SubtaskState {
    Executing { attempt: usize },
    Validating { attempt: usize, response: String },
    Retrying { attempt: usize, reason: String },
    Done(SubtaskResult),
}

/// Runs subtasks against the model.
pub struct SubtaskExecutor<'a> {
    gateway: &'a dyn ModelGateway,
    sink: &'a EventSink,
    params: GenerationParams,
    validation_params: GenerationParams,
    max_retries: usize,
    enricher: Option<&'a Enricher>,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> SubtaskExecutor<'a> {
    pub fn new(
        gateway: &'a dyn ModelGateway,
        sink: &'a EventSink,
        params: GenerationParams,
        validation_temperature: f32,
        max_retries: usize,
    ) -> Self {
        Self {
            gateway,
            sink,
            params,
            validation_params: params.with_temperature(validation_temperature),
            max_retries,
            enricher: None,
            cancel: None,
        }
    }

    /// Enriches each subtask with web material before executing it.
    #[must_use]
    pub fn with_enricher(mut self, enricher: &'a Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Stops retrying once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Executes one subtask to completion or retry exhaustion.
    ///
    /// Never fails: model errors count as incomplete attempts and the final
    /// result carries `completed = false` when the budget runs out.
    pub async fn execute(&self, request: SubtaskRequest<'_>) -> SubtaskResult {
        let index = request.index;
        self.sink.publish(ReasoningEvent::subtask_start(
            index,
            request.total,
            request.subtask,
        ));

        let context = self.context_for(&request).await;
        let rendered_context = context.render();
        let previous: Vec<PriorResult<'_>> =
            request.previous.iter().map(SubtaskResult::as_prior).collect();

        let mut last_response = String::new();
        let mut validation_announced = false;
        let mut state = SubtaskState::Executing { attempt: 1 };

        loop {
            state = match state {
                SubtaskState::Executing { attempt } => {
                    let prompt = prompts::execute(&ExecuteVars {
                        task: request.task,
                        subtask: request.subtask,
                        index: index + 1,
                        total: request.total,
                        context: rendered_context.as_deref(),
                        previous: previous.clone(),
                    });
                    let response = match prompt {
                        Ok(prompt) => self
                            .gateway
                            .generate(&prompt, self.params)
                            .await
                            .map_err(|e| e.to_string()),
                        Err(e) => Err(format!("failed to render prompt: {e}")),
                    };
                    match response {
                        Ok(response) => SubtaskState::Validating { attempt, response },
                        Err(reason) => {
                            tracing::warn!(subtask = index, attempt, %reason, "subtask model call failed");
                            self.announce_validation(index, &mut validation_announced);
                            SubtaskState::Retrying {
                                attempt,
                                reason: format!("model call failed: {reason}"),
                            }
                        }
                    }
                }
                SubtaskState::Validating { attempt, response } => {
                    self.announce_validation(index, &mut validation_announced);
                    let verdict = self.validate(&request, &response).await;
                    last_response = response;
                    match verdict {
                        Verdict::Complete => {
                            self.sink.publish(ReasoningEvent::subtask_complete(
                                index,
                                attempt,
                                &last_response,
                            ));
                            SubtaskState::Done(self.result(&request, &last_response, attempt, true))
                        }
                        Verdict::Incomplete(reason) => SubtaskState::Retrying { attempt, reason },
                    }
                }
                SubtaskState::Retrying { attempt, reason } => {
                    if attempt > self.max_retries {
                        self.sink.publish(ReasoningEvent::subtask_max_retries(
                            index,
                            attempt,
                            &last_response,
                        ));
                        SubtaskState::Done(self.result(&request, &last_response, attempt, false))
                    } else if self.cancel.is_some_and(CancellationToken::is_cancelled) {
                        tracing::info!(subtask = index, attempt, "cancelled before retry");
                        self.sink
                            .publish(ReasoningEvent::subtask_incomplete(index, attempt, &reason));
                        SubtaskState::Done(self.result(&request, &last_response, attempt, false))
                    } else {
                        self.sink
                            .publish(ReasoningEvent::subtask_incomplete(index, attempt, &reason));
                        self.sink.publish(ReasoningEvent::subtask_retry(
                            index,
                            attempt + 1,
                            self.max_retries,
                        ));
                        SubtaskState::Executing {
                            attempt: attempt + 1,
                        }
                    }
                }
                SubtaskState::Done(result) => return result,
            };
        }
    }

    async fn context_for(&self, request: &SubtaskRequest<'_>) -> ResearchContext {
        let mut context = request.context.clone();
        if let Some(enricher) = self.enricher {
            let material = enricher
                .enrich(
                    request.subtask,
                    request.index,
                    self.gateway,
                    self.sink,
                )
                .await;
            context.extend(material);
        }
        context
    }

    async fn validate(&self, request: &SubtaskRequest<'_>, response: &str) -> Verdict {
        let prompt = match prompts::validate(&ValidateVars {
            task: request.task,
            subtask: request.subtask,
            response,
        }) {
            Ok(prompt) => prompt,
            Err(e) => return Verdict::Incomplete(format!("failed to render prompt: {e}")),
        };
        match self.gateway.generate(&prompt, self.validation_params).await {
            Ok(reply) => parse_verdict(&reply),
            Err(e) => {
                tracing::warn!(subtask = request.index, error = %e, "validation call failed");
                Verdict::Incomplete(format!("validation call failed: {e}"))
            }
        }
    }

    fn announce_validation(&self, index: usize, announced: &mut bool) {
        if !*announced {
            *announced = true;
            self.sink
                .publish(ReasoningEvent::subtask_validation_start(index));
        }
    }

    fn result(
        &self,
        request: &SubtaskRequest<'_>,
        response: &str,
        attempts: usize,
        completed: bool,
    ) -> SubtaskResult {
        SubtaskResult {
            index: request.index,
            subtask: request.subtask.to_string(),
            response: response.to_string(),
            attempts,
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventKind;
    use crate::providers::ProviderError;
    use crate::reasoning::test_support::{ScriptedGateway, drain, names};

    fn request<'a>(context: &'a ResearchContext, previous: &'a [SubtaskResult]) -> SubtaskRequest<'a> {
        SubtaskRequest {
            task: "Analyze global warming causes",
            subtask: "List greenhouse gases",
            index: 0,
            total: 2,
            context,
            previous,
        }
    }

    fn executor<'a>(
        gateway: &'a ScriptedGateway,
        sink: &'a EventSink,
        max_retries: usize,
    ) -> SubtaskExecutor<'a> {
        SubtaskExecutor::new(gateway, sink, GenerationParams::new(0.7, None), 0.1, max_retries)
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("COMPLETE"), Verdict::Complete);
        assert_eq!(parse_verdict("yes, it does"), Verdict::Complete);
        assert_eq!(parse_verdict("**Complete**"), Verdict::Complete);
        assert_eq!(parse_verdict("Maybe?"), Verdict::Complete);
        assert_eq!(
            parse_verdict("INCOMPLETE: missing methane"),
            Verdict::Incomplete("missing methane".to_string())
        );
        assert_eq!(
            parse_verdict("No. It skips CO2."),
            Verdict::Incomplete("It skips CO2.".to_string())
        );
        assert!(matches!(parse_verdict("incomplete"), Verdict::Incomplete(_)));
        assert_eq!(parse_verdict("Notably complete"), Verdict::Complete);
    }

    #[tokio::test]
    async fn test_complete_on_first_attempt() {
        let gateway = ScriptedGateway::new(["CO2, methane", "COMPLETE"]);
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let context = ResearchContext::new();

        let result = executor(&gateway, &sink, 3)
            .execute(request(&context, &[]))
            .await;

        assert!(result.completed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.response, "CO2, methane");
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["subtask_start", "subtask_validation_start", "subtask_complete"]
        );
        assert_eq!(gateway.temperatures(), vec![0.7, 0.1]);
    }

    #[tokio::test]
    async fn test_retries_until_complete() {
        let gateway = ScriptedGateway::new(["draft", "INCOMPLETE: too short", "better", "COMPLETE"]);
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let context = ResearchContext::new();

        let result = executor(&gateway, &sink, 3)
            .execute(request(&context, &[]))
            .await;

        assert!(result.completed);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.response, "better");
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "subtask_start",
                "subtask_validation_start",
                "subtask_incomplete",
                "subtask_retry",
                "subtask_complete"
            ]
        );
        assert!(matches!(
            &events[2].kind,
            EventKind::SubtaskIncomplete { attempt: 1, reason, .. } if reason == "too short"
        ));
        assert!(matches!(
            events[3].kind,
            EventKind::SubtaskRetry {
                attempt: 2,
                max_retries: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_last_response() {
        let max_retries = 2;
        let mut script = Vec::new();
        for i in 1..=max_retries + 1 {
            script.push(format!("attempt {i}"));
            script.push("INCOMPLETE".to_string());
        }
        let gateway = ScriptedGateway::new(script);
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let context = ResearchContext::new();

        let result = executor(&gateway, &sink, max_retries)
            .execute(request(&context, &[]))
            .await;

        assert!(!result.completed);
        assert_eq!(result.attempts, max_retries + 1);
        assert_eq!(result.response, "attempt 3");

        let events = names(&drain(&mut rx));
        assert_eq!(
            events,
            vec![
                "subtask_start",
                "subtask_validation_start",
                "subtask_incomplete",
                "subtask_retry",
                "subtask_incomplete",
                "subtask_retry",
                "subtask_max_retries"
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let gateway = ScriptedGateway::new(["only", "NO"]);
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let context = ResearchContext::new();

        let result = executor(&gateway, &sink, 0)
            .execute(request(&context, &[]))
            .await;

        assert!(!result.completed);
        assert_eq!(result.attempts, 1);
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["subtask_start", "subtask_validation_start", "subtask_max_retries"]
        );
    }

    #[tokio::test]
    async fn test_provider_errors_count_as_incomplete_attempts() {
        let gateway = ScriptedGateway::from_results(vec![
            Err(ProviderError::http_status(429, "")),
            Ok("recovered".to_string()),
            Ok("COMPLETE".to_string()),
        ]);
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let context = ResearchContext::new();

        let result = executor(&gateway, &sink, 3)
            .execute(request(&context, &[]))
            .await;

        assert!(result.completed);
        assert_eq!(result.attempts, 2);
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "subtask_start",
                "subtask_validation_start",
                "subtask_incomplete",
                "subtask_retry",
                "subtask_complete"
            ]
        );
        assert!(events[2].message.contains("HTTP 429"));
    }

    #[tokio::test]
    async fn test_all_calls_failing_yields_empty_response() {
        let gateway = ScriptedGateway::from_results(Vec::new());
        let sink = EventSink::new();
        let context = ResearchContext::new();

        let result = executor(&gateway, &sink, 1)
            .execute(request(&context, &[]))
            .await;

        assert!(!result.completed);
        assert_eq!(result.attempts, 2);
        assert!(result.response.is_empty());
    }

    #[tokio::test]
    async fn test_previous_results_and_context_reach_prompt() {
        let gateway = ScriptedGateway::new(["answer", "COMPLETE"]);
        let sink = EventSink::new();
        let mut context = ResearchContext::new();
        context.add_note("IPCC AR6 summary");
        let previous = vec![SubtaskResult {
            index: 0,
            subtask: "Define warming".to_string(),
            response: "Warming is...".to_string(),
            attempts: 1,
            completed: true,
        }];

        let mut req = request(&context, &previous);
        req.index = 1;
        executor(&gateway, &sink, 3).execute(req).await;

        let prompt = &gateway.prompts()[0];
        assert!(prompt.starts_with("Subtask 2/2: List greenhouse gases"));
        assert!(prompt.contains("Context:\nIPCC AR6 summary"));
        assert!(prompt.contains("Previous results:\nSubtask 1: Define warming\nResult: Warming is..."));

        let validation = &gateway.prompts()[1];
        assert!(validation.contains("Original task: Analyze global warming causes"));
        assert!(validation.contains("answer"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let gateway = ScriptedGateway::new(["draft", "INCOMPLETE"]);
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let context = ResearchContext::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor(&gateway, &sink, 3)
            .with_cancellation(&cancel)
            .execute(request(&context, &[]))
            .await;

        assert!(!result.completed);
        assert_eq!(result.response, "draft");
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["subtask_start", "subtask_validation_start", "subtask_incomplete"]
        );
        assert!(matches!(
            events.last().unwrap().kind,
            EventKind::SubtaskIncomplete { index: 0, attempt: 1, .. }
        ));
    }
}
