//! Generate command handler.

use std::io::{Write, stderr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use delve_core::config::Config;
use delve_core::core::interrupt::{self, InterruptedError};
use delve_core::providers::{ChatMessage, GenerationParams, ModelGateway, build_gateway};
use delve_core::research::read_files;

use crate::modes;

pub struct GenerateRunOptions<'a> {
    pub config: &'a Config,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
    pub prompt: &'a str,
    pub files: &'a [PathBuf],
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

pub async fn run(options: GenerateRunOptions<'_>) -> Result<()> {
    let prompt = build_prompt(&options)?;
    let gateway = build_gateway(options.config, options.provider, options.model)
        .context("configure model provider")?;
    let reasoning = &options.config.reasoning;
    let params = GenerationParams::new(
        options.temperature.unwrap_or(reasoning.temperature),
        options.max_tokens.or(reasoning.max_tokens),
    );

    if options.stream {
        let messages = [ChatMessage::user(prompt)];
        let stream = gateway
            .chat_stream(&messages, params)
            .await
            .context("start streaming reply")?;
        modes::print_stream(stream).await?;
        return Ok(());
    }

    let reply = tokio::select! {
        reply = gateway.generate(&prompt, params) => reply.context("generate reply")?,
        () = interrupt::wait_for_interrupt() => {
            let _ = writeln!(stderr(), "^C Interrupted.");
            return Err(InterruptedError.into());
        }
    };
    println!("{}", reply.trim_end());
    Ok(())
}

/// Prepends file contents to the prompt when files are given.
fn build_prompt(options: &GenerateRunOptions<'_>) -> Result<String> {
    let prompt = options.prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("Prompt must not be empty");
    }
    if options.files.is_empty() {
        return Ok(prompt.to_string());
    }

    let context = read_files(options.files, &options.config.files).context("read input files")?;
    Ok(match context.render() {
        Some(rendered) => format!("Context:\n{rendered}\n\n{prompt}"),
        None => prompt.to_string(),
    })
}
