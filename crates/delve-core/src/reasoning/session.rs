//! Session coordinator: decompose, execute each subtask in order, aggregate.
//!
//! A session owns its event sink, research context and results. Stages run
//! strictly in sequence on one tokio task. Cancellation is cooperative and
//! checked between stages; the session deadline is raced against every
//! stage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::aggregate::{ResultAggregator, assemble_partial};
use super::decompose::TaskDecomposer;
use super::enrich::Enricher;
use super::error::{ReasoningError, ReasoningResult};
use super::execute::{SubtaskExecutor, SubtaskRequest, SubtaskResult};
use crate::config::ReasoningConfig;
use crate::core::context::ResearchContext;
use crate::core::events::ReasoningEvent;
use crate::core::sink::{EventRx, EventSink};
use crate::providers::{GenerationParams, ModelGateway};

/// Per-session knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub step_ceiling: usize,
    pub max_retries: usize,
    pub temperature: f32,
    pub validation_temperature: f32,
    pub max_tokens: Option<u32>,
    /// Enrich subtasks with web search. Requires an enricher.
    pub web_search: bool,
    /// Session-wide deadline, measured from the start of `run`.
    pub timeout: Option<Duration>,
}

impl SessionOptions {
    pub fn from_config(config: &ReasoningConfig) -> Self {
        Self {
            step_ceiling: config.max_steps.max(1),
            max_retries: config.max_retries,
            temperature: config.temperature,
            validation_temperature: config.validation_temperature,
            max_tokens: config.max_tokens,
            web_search: config.web_search,
            timeout: config.timeout(),
        }
    }

    fn params(&self) -> GenerationParams {
        GenerationParams::new(self.temperature, self.max_tokens)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ReasoningConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Cancelled,
    TimedOut,
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    /// Accepted subtasks; empty if the session stopped before decomposition.
    pub subtasks: Vec<String>,
    pub results: Vec<SubtaskResult>,
    /// Aggregated answer when completed; locally joined partial results
    /// when timed out.
    pub answer: Option<String>,
}

/// One reasoning run over a task.
pub struct ReasoningSession {
    id: Uuid,
    task: String,
    context: ResearchContext,
    options: SessionOptions,
    gateway: Arc<dyn ModelGateway>,
    enricher: Option<Arc<Enricher>>,
    sink: EventSink,
    cancel: CancellationToken,
}

impl ReasoningSession {
    pub fn new(
        task: impl Into<String>,
        context: ResearchContext,
        options: SessionOptions,
        gateway: Arc<dyn ModelGateway>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            context,
            options,
            gateway,
            enricher: None,
            sink: EventSink::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the search/extraction enricher used when `web_search` is on.
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Uses `token` instead of the session's own cancellation token.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Attaches a new subscriber. Subscribe before starting to see every event.
    pub fn subscribe(&self) -> EventRx {
        self.sink.subscribe()
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Token that cancels this session when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns the session on the current runtime and returns immediately.
    pub fn start(self) -> SessionHandle {
        let id = self.id;
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        SessionHandle { id, cancel, join }
    }

    /// Runs the session to its end on the current task.
    ///
    /// # Errors
    /// Returns an error when decomposition or aggregation fails, or when the
    /// deadline passes before decomposition completes.
    pub async fn run(self) -> ReasoningResult<SessionOutcome> {
        let started = Instant::now();
        let deadline = self.options.timeout.map(|t| started + t);
        let session = self.id;
        tracing::info!(%session, task = %self.task, "reasoning session started");

        let gateway = self.gateway.as_ref();
        let params = self.options.params();

        if self.cancel.is_cancelled() {
            return Ok(self.stop_cancelled(Vec::new(), Vec::new()));
        }

        let decomposer = TaskDecomposer::new(gateway, &self.sink, params);
        let subtasks = match within(
            deadline,
            decomposer.decompose(&self.task, &self.context, self.options.step_ceiling),
        )
        .await
        {
            Some(Ok(subtasks)) => subtasks,
            Some(Err(err)) => {
                self.sink
                    .publish(ReasoningEvent::error(err.event_kind(), true, err.to_string()));
                return Err(err);
            }
            None => {
                let elapsed_secs = started.elapsed().as_secs();
                self.sink.publish(ReasoningEvent::timeout(elapsed_secs, 0));
                return Err(ReasoningError::Timeout { elapsed_secs });
            }
        };

        let enricher = self.active_enricher();
        let mut executor = SubtaskExecutor::new(
            gateway,
            &self.sink,
            params,
            self.options.validation_temperature,
            self.options.max_retries,
        )
        .with_cancellation(&self.cancel);
        if let Some(enricher) = enricher {
            executor = executor.with_enricher(enricher);
        }

        let total = subtasks.len();
        let mut results: Vec<SubtaskResult> = Vec::with_capacity(total);
        let mut stopped = None;
        for (index, subtask) in subtasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                stopped = Some(SessionStatus::Cancelled);
                break;
            }
            let request = SubtaskRequest {
                task: &self.task,
                subtask,
                index,
                total,
                context: &self.context,
                previous: &results,
            };
            let Some(result) = within(deadline, executor.execute(request)).await else {
                stopped = Some(SessionStatus::TimedOut);
                break;
            };
            tracing::info!(
                %session,
                subtask = index,
                completed = result.completed,
                attempts = result.attempts,
                "subtask finished"
            );
            results.push(result);
        }

        if stopped.is_none() && self.cancel.is_cancelled() {
            stopped = Some(SessionStatus::Cancelled);
        }
        match stopped {
            Some(SessionStatus::Cancelled) => return Ok(self.stop_cancelled(subtasks, results)),
            Some(SessionStatus::TimedOut) => {
                return Ok(self.stop_timed_out(started, subtasks, results));
            }
            Some(SessionStatus::Completed) | None => {}
        }

        let aggregator = ResultAggregator::new(gateway, &self.sink, params);
        match within(deadline, aggregator.aggregate(&self.task, &subtasks, &results)).await {
            Some(Ok(answer)) => {
                tracing::info!(%session, "reasoning session completed");
                Ok(SessionOutcome {
                    status: SessionStatus::Completed,
                    subtasks,
                    results,
                    answer: Some(answer),
                })
            }
            Some(Err(err)) => {
                self.sink
                    .publish(ReasoningEvent::error(err.event_kind(), true, err.to_string()));
                Err(err)
            }
            None => Ok(self.stop_timed_out(started, subtasks, results)),
        }
    }

    fn active_enricher(&self) -> Option<&Enricher> {
        if !self.options.web_search {
            return None;
        }
        if self.enricher.is_none() {
            tracing::warn!("web search enabled but no search provider configured");
        }
        self.enricher.as_deref()
    }

    fn stop_cancelled(&self, subtasks: Vec<String>, results: Vec<SubtaskResult>) -> SessionOutcome {
        tracing::info!(session = %self.id, completed = results.len(), "reasoning session cancelled");
        self.sink.publish(ReasoningEvent::cancelled(results.len()));
        SessionOutcome {
            status: SessionStatus::Cancelled,
            subtasks,
            results,
            answer: None,
        }
    }

    fn stop_timed_out(
        &self,
        started: Instant,
        subtasks: Vec<String>,
        results: Vec<SubtaskResult>,
    ) -> SessionOutcome {
        let elapsed_secs = started.elapsed().as_secs();
        tracing::warn!(session = %self.id, elapsed_secs, completed = results.len(), "reasoning session timed out");
        self.sink
            .publish(ReasoningEvent::timeout(elapsed_secs, results.len()));
        let answer = (!results.is_empty()).then(|| assemble_partial(&self.task, &results));
        SessionOutcome {
            status: SessionStatus::TimedOut,
            subtasks,
            results,
            answer,
        }
    }
}

/// Awaits `fut`, giving up at `deadline`.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Handle to a spawned session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<ReasoningResult<SessionOutcome>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Requests cooperative cancellation. Takes effect at the next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the session to end.
    ///
    /// # Errors
    /// Returns the session's own error, or `Aborted` if its task panicked.
    pub async fn wait(self) -> ReasoningResult<SessionOutcome> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => Err(ReasoningError::Aborted(err.to_string())),
        }
    }
}
