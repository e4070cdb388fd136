//! Chat command handler: a line-based REPL on stdin.

use std::io::{Write, stderr, stdout};
use std::path::Path;

use anyhow::{Context, Result};
use delve_core::config::Config;
use delve_core::core::conversation::Conversation;
use delve_core::core::interrupt::{self, InterruptedError};
use delve_core::providers::{GenerationParams, ModelGateway, build_gateway};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::modes;

const HELP: &str = "Commands: exit | quit | clear | save <path> | load <path> | help";

/// A parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Exit,
    Clear,
    Save(&'a str),
    Load(&'a str),
    Help,
    Empty,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    match (command, arg) {
        ("", _) => Input::Empty,
        ("exit" | "quit", "") => Input::Exit,
        ("clear", "") => Input::Clear,
        ("help", "") => Input::Help,
        ("save", path) if !path.is_empty() => Input::Save(path),
        ("load", path) if !path.is_empty() => Input::Load(path),
        _ => Input::Message(line),
    }
}

pub async fn run(config: &Config, provider: Option<&str>, model: Option<&str>) -> Result<()> {
    let gateway = build_gateway(config, provider, model).context("configure model provider")?;
    let params = GenerationParams::new(config.reasoning.temperature, config.reasoning.max_tokens);
    let token_limit = config.chat.token_limit;
    let mut conversation = Conversation::new(config.chat.system_prompt.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let _ = writeln!(stderr(), "delve chat. {HELP}");

    loop {
        let _ = write!(stdout(), "> ");
        let _ = stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line.context("read input")?,
            () = interrupt::wait_for_interrupt() => {
                let _ = writeln!(stdout());
                break;
            }
        };
        // EOF
        let Some(line) = line else {
            let _ = writeln!(stdout());
            break;
        };

        match parse_input(&line) {
            Input::Exit => break,
            Input::Empty => {}
            Input::Help => {
                let _ = writeln!(stderr(), "{HELP}");
            }
            Input::Clear => {
                conversation.clear();
                let _ = writeln!(stderr(), "History cleared.");
            }
            Input::Save(path) => match conversation.save(Path::new(path)) {
                Ok(()) => {
                    let _ = writeln!(stderr(), "Saved conversation to {path}");
                }
                Err(e) => {
                    let _ = writeln!(stderr(), "Error: {e:#}");
                }
            },
            Input::Load(path) => match Conversation::load(Path::new(path)) {
                Ok(loaded) => {
                    conversation = loaded;
                    let _ = writeln!(
                        stderr(),
                        "Loaded {} messages from {path}",
                        conversation.history().len()
                    );
                }
                Err(e) => {
                    let _ = writeln!(stderr(), "Error: {e:#}");
                }
            },
            Input::Message(text) => {
                conversation.add_user(text);
                conversation.truncate_to_limit(token_limit);
                reply(&gateway, &mut conversation, params).await;
            }
        }
    }

    Ok(())
}

/// Streams one reply. Errors and interrupts are reported without ending the REPL.
async fn reply(gateway: &dyn ModelGateway, conversation: &mut Conversation, params: GenerationParams) {
    let messages = conversation.to_messages();
    let result = match gateway.chat_stream(&messages, params).await {
        Ok(stream) => modes::print_stream(stream).await,
        Err(e) => Err(anyhow::Error::new(e).context("start streaming reply")),
    };

    match result {
        Ok(text) => conversation.add_assistant(text),
        Err(e) if e.downcast_ref::<InterruptedError>().is_some() => {
            interrupt::reset();
        }
        Err(e) => {
            let _ = writeln!(stderr(), "Error: {e:#}");
        }
    }
}
