//! Event rendering for `delve reason`.
//!
//! Human mode writes progress to stderr so stdout carries only the answer.
//! JSON mode writes one event per line to stdout.

use std::io::{Stderr, Stdout, Write, stderr, stdout};

use delve_core::core::events::{ErrorKind, EventKind, ReasoningEvent};
use delve_core::core::sink::EventRx;
use tokio::task::JoinHandle;

pub struct ReasonRenderer<O: Write = Stdout, E: Write = Stderr> {
    out: O,
    err: E,
    json: bool,
}

impl ReasonRenderer {
    pub fn new(json: bool) -> Self {
        Self::with_writers(stdout(), stderr(), json)
    }
}

impl<O: Write, E: Write> ReasonRenderer<O, E> {
    pub fn with_writers(out: O, err: E, json: bool) -> Self {
        Self { out, err, json }
    }

    pub fn handle_event(&mut self, event: &ReasoningEvent) {
        if self.json {
            self.write_json(event);
        } else {
            self.write_human(event);
        }
    }

    fn write_json(&mut self, event: &ReasoningEvent) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let _ = writeln!(self.out, "{line}");
                let _ = self.out.flush();
            }
            Err(e) => tracing::warn!(event = event.name(), "failed to serialize event: {e}"),
        }
    }

    fn write_human(&mut self, event: &ReasoningEvent) {
        let message = &event.message;
        match &event.kind {
            EventKind::DecompositionStart { .. } | EventKind::AggregationStart { .. } => {
                let _ = writeln!(self.err, "⚙ {message}...");
            }
            EventKind::DecompositionRetry { .. } | EventKind::SubtaskRetry { .. } => {
                let _ = writeln!(self.err, "↻ {message}");
            }
            EventKind::DecompositionComplete { subtasks } => {
                let _ = writeln!(self.err, "✓ {message}:");
                for (i, subtask) in subtasks.iter().enumerate() {
                    let _ = writeln!(self.err, "  {}. {subtask}", i + 1);
                }
            }
            EventKind::SubtaskStart { .. } => {
                let _ = writeln!(self.err, "\n▶ {message}");
            }
            EventKind::SubtaskValidationStart { .. } => {
                let _ = writeln!(self.err, "  {message}");
            }
            EventKind::SubtaskComplete { attempts, .. } => {
                if *attempts > 1 {
                    let _ = writeln!(self.err, "✓ {message} ({attempts} attempts)");
                } else {
                    let _ = writeln!(self.err, "✓ {message}");
                }
            }
            EventKind::SubtaskIncomplete { .. } | EventKind::SubtaskMaxRetries { .. } => {
                let _ = writeln!(self.err, "✗ {message}");
            }
            EventKind::AggregationComplete { .. } => {
                let _ = writeln!(self.err, "✓ {message}\n");
            }
            EventKind::Error {
                kind: ErrorKind::Cancelled,
                ..
            } => {
                let _ = writeln!(self.err, "\n^C Interrupted. {message}");
            }
            EventKind::Error { kind, fatal, .. } => {
                let label = if *fatal { "Error" } else { "Warning" };
                let _ = writeln!(self.err, "{label} [{kind}]: {message}");
            }
            EventKind::Timeout { .. } => {
                let _ = writeln!(self.err, "⏱ {message}");
            }
        }
        let _ = self.err.flush();
    }

    pub fn finish(&mut self) {
        let _ = self.out.flush();
        let _ = self.err.flush();
    }
}

/// Spawns a task that renders events until every sender is dropped.
pub fn spawn_reason_renderer_task(mut rx: EventRx, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ReasonRenderer::new(json);

        while let Some(event) = rx.recv().await {
            renderer.handle_event(&event);
        }

        renderer.finish();
    })
}
