//! Reason command handler.

use std::io::{Write, stderr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use delve_core::config::Config;
use delve_core::core::context::ResearchContext;
use delve_core::core::interrupt::{self, InterruptedError};
use delve_core::providers::{GenerationParams, ModelGateway, build_gateway};
use delve_core::reasoning::{
    DEFAULT_DOCUMENT_QUESTION, Enricher, ReasoningSession, SessionOptions, SessionOutcome,
    SessionStatus, chain_of_thought,
};
use delve_core::research::{BochaConfig, BochaSearch, build_extractor, read_files};
use serde_json::json;

use crate::modes;

pub struct ReasonRunOptions<'a> {
    pub config: &'a Config,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
    pub topic: Option<&'a str>,
    pub files: &'a [PathBuf],
    pub steps: Option<usize>,
    pub retries: Option<usize>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub web_search: Option<bool>,
    pub bocha_api_key: Option<&'a str>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

impl ReasonRunOptions<'_> {
    fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::from_config(&self.config.reasoning);
        if let Some(steps) = self.steps {
            options.step_ceiling = steps.max(1);
        }
        if let Some(retries) = self.retries {
            options.max_retries = retries;
        }
        if let Some(temperature) = self.temperature {
            options.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            options.max_tokens = Some(max_tokens);
        }
        if let Some(web_search) = self.web_search {
            options.web_search = web_search;
        }
        if let Some(secs) = self.timeout_secs {
            options.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        options
    }
}

pub async fn run(options: ReasonRunOptions<'_>) -> Result<()> {
    let topic = options.topic.map(str::trim).filter(|t| !t.is_empty());
    if topic.is_none() && options.files.is_empty() {
        anyhow::bail!("Provide a topic or at least one --file");
    }

    let context = if options.files.is_empty() {
        ResearchContext::new()
    } else {
        read_files(options.files, &options.config.files).context("read input files")?
    };
    let gateway = build_gateway(options.config, options.provider, options.model)
        .context("configure model provider")?;

    let Some(topic) = topic else {
        return run_chain(&gateway, &context, &options).await;
    };

    let session_options = options.session_options();
    let web_search = session_options.web_search;
    let gateway: Arc<dyn ModelGateway> = Arc::new(gateway);
    let mut session = ReasoningSession::new(topic, context, session_options, gateway);
    if web_search {
        session = session.with_enricher(Arc::new(build_enricher(&options)?));
    }
    tracing::info!(session = %session.id(), "starting reasoning session");

    let renderer = modes::spawn_reason_renderer_task(session.subscribe(), options.json);
    let interrupt_bridge = interrupt::cancel_on_interrupt(session.cancellation_token());

    // The session owns the sink; once `run` returns the renderer drains and exits.
    let result = session.run().await;
    interrupt_bridge.abort();
    let _ = renderer.await;

    let outcome = result.context("reasoning failed")?;
    finish(&outcome, options.json)
}

fn build_enricher(options: &ReasonRunOptions<'_>) -> Result<Enricher> {
    let bocha = BochaConfig::from_config(&options.config.search, options.bocha_api_key)
        .context("configure web search")?;
    if bocha.api_key.is_none() {
        tracing::warn!("web search enabled without a Bocha API key; searches will fail");
    }
    let extractor = build_extractor(&options.config.extract).context("configure extractor")?;
    Ok(Enricher::new(Arc::new(BochaSearch::new(bocha)), extractor).configured(options.config))
}

fn finish(outcome: &SessionOutcome, json: bool) -> Result<()> {
    match outcome.status {
        SessionStatus::Cancelled => Err(InterruptedError.into()),
        SessionStatus::TimedOut => {
            let _ = writeln!(
                stderr(),
                "Warning: session timed out; showing partial results."
            );
            print_answer(outcome, json);
            Ok(())
        }
        SessionStatus::Completed => {
            print_answer(outcome, json);
            Ok(())
        }
    }
}

fn print_answer(outcome: &SessionOutcome, json: bool) {
    let answer = outcome.answer.as_deref().unwrap_or_default();
    if json {
        let incomplete = outcome.results.iter().filter(|r| !r.completed).count();
        println!(
            "{}",
            json!({
                "type": "final_answer",
                "status": outcome.status,
                "answer": answer,
                "subtasks": outcome.subtasks,
                "incomplete_subtasks": incomplete,
            })
        );
    } else if !answer.is_empty() {
        println!("{}", answer.trim_end());
    }
}

/// Answers the default document question over file context.
async fn run_chain(
    gateway: &dyn ModelGateway,
    context: &ResearchContext,
    options: &ReasonRunOptions<'_>,
) -> Result<()> {
    let reasoning = &options.config.reasoning;
    let params = GenerationParams::new(
        options.temperature.unwrap_or(reasoning.temperature),
        options.max_tokens.or(reasoning.max_tokens),
    );
    if !options.json {
        let _ = writeln!(stderr(), "⚙ Reasoning over {} file(s)...", options.files.len());
    }

    let result = tokio::select! {
        result = chain_of_thought(gateway, DEFAULT_DOCUMENT_QUESTION, context, params) => {
            result.context("chain-of-thought failed")?
        }
        () = interrupt::wait_for_interrupt() => {
            let _ = writeln!(stderr(), "\n^C Interrupted.");
            return Err(InterruptedError.into());
        }
    };

    if options.json {
        println!(
            "{}",
            json!({
                "type": "final_answer",
                "status": SessionStatus::Completed,
                "question": DEFAULT_DOCUMENT_QUESTION,
                "reasoning": result.reasoning,
                "answer": result.answer,
            })
        );
    } else {
        let _ = writeln!(stderr(), "\nReasoning:\n{}\n", result.reasoning.trim());
        println!("{}", result.answer.trim_end());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(config: &Config) -> ReasonRunOptions<'_> {
        ReasonRunOptions {
            config,
            provider: None,
            model: None,
            topic: Some("topic"),
            files: &[],
            steps: None,
            retries: None,
            temperature: None,
            max_tokens: None,
            web_search: None,
            bocha_api_key: None,
            timeout_secs: None,
            json: false,
        }
    }

    #[test]
    fn test_session_options_default_to_config() {
        let config = Config::default();
        let session = options(&config).session_options();
        assert_eq!(session, SessionOptions::from_config(&config.reasoning));
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config::default();
        let session = ReasonRunOptions {
            steps: Some(0),
            retries: Some(1),
            temperature: Some(0.2),
            max_tokens: Some(512),
            web_search: Some(true),
            timeout_secs: Some(0),
            ..options(&config)
        }
        .session_options();

        assert_eq!(session.step_ceiling, 1);
        assert_eq!(session.max_retries, 1);
        assert!((session.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(session.max_tokens, Some(512));
        assert!(session.web_search);
        assert_eq!(session.timeout, None);
    }
}
