//! CLI entry and dispatch.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use delve_core::config::{self, LoggingConfig};
use delve_core::core::interrupt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "DELVE_LOG";

#[derive(Parser)]
#[command(name = "delve")]
#[command(version)]
#[command(about = "Multi-step reasoning research assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Provider to use (default: `default_provider` from config)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Override the model from config
    #[arg(long, global = true)]
    model: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Breaks a topic into subtasks, answers each, and combines the results
    Reason {
        /// The topic or question to reason about
        #[arg(value_name = "TOPIC")]
        topic: Option<String>,

        /// Files to use as context (repeatable)
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Maximum number of subtasks
        #[arg(long)]
        steps: Option<usize>,

        /// Retries per incomplete subtask
        #[arg(long)]
        retries: Option<usize>,

        /// Sampling temperature for generation
        #[arg(long)]
        temperature: Option<f32>,

        /// Maximum tokens per model reply
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Enrich subtasks with web search results
        #[arg(long, conflicts_with = "no_web_search")]
        web_search: bool,

        /// Disable web search even if enabled in config
        #[arg(long = "no-web-search")]
        no_web_search: bool,

        /// API key for Bocha web search
        #[arg(long, env = "BOCHA_API_KEY", hide_env_values = true)]
        bocha_api_key: Option<String>,

        /// Session timeout in seconds (0 disables)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print events and the final answer as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Sends a single prompt and prints the reply
    Generate {
        /// The prompt to send
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Files to include as context (repeatable)
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Maximum tokens in the reply
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Wait for the full reply instead of streaming it
        #[arg(long = "no-stream")]
        no_stream: bool,
    },
    /// Starts an interactive chat session
    Chat,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// List configured providers
    List,
    /// Show a provider's settings
    Show {
        /// Provider name (default: the default provider)
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },
    /// Set the default provider
    SetDefault {
        /// Provider name
        #[arg(value_name = "NAME")]
        name: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Path and init must work even when the config file is broken.
    if let Commands::Config { command } = &cli.command {
        match command {
            ConfigCommands::Path => {
                commands::config::path();
                return Ok(());
            }
            ConfigCommands::Init => return commands::config::init(),
            _ => {}
        }
    }

    let config = config::Config::load().context("load config")?;
    let _log_guard = init_logging(cli.verbose, &config.logging)?;
    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli, config).await })
}

/// Installs the global tracing subscriber.
///
/// The returned guard flushes the file writer on drop and must outlive
/// the runtime.
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(fallback))
        .context("build log filter")?;

    if logging.file {
        let dir = config::paths::logs_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, "delve.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(writer)
            .try_init();
        return Ok(Some(guard));
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(None)
}

async fn dispatch(cli: Cli, config: config::Config) -> Result<()> {
    let Cli {
        command,
        provider,
        model,
        verbose: _,
    } = cli;
    let provider = provider.as_deref();
    let model = model.as_deref();

    match command {
        Commands::Reason {
            topic,
            files,
            steps,
            retries,
            temperature,
            max_tokens,
            web_search,
            no_web_search,
            bocha_api_key,
            timeout,
            json,
        } => {
            let web_search = match (web_search, no_web_search) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            commands::reason::run(commands::reason::ReasonRunOptions {
                config: &config,
                provider,
                model,
                topic: topic.as_deref(),
                files: &files,
                steps,
                retries,
                temperature,
                max_tokens,
                web_search,
                bocha_api_key: bocha_api_key.as_deref(),
                timeout_secs: timeout,
                json,
            })
            .await
        }
        Commands::Generate {
            prompt,
            files,
            temperature,
            max_tokens,
            no_stream,
        } => {
            commands::generate::run(commands::generate::GenerateRunOptions {
                config: &config,
                provider,
                model,
                prompt: &prompt,
                files: &files,
                temperature,
                max_tokens,
                stream: !no_stream,
            })
            .await
        }
        Commands::Chat => commands::chat::run(&config, provider, model).await,
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::List => {
                commands::config::list(&config);
                Ok(())
            }
            ConfigCommands::Show { name } => commands::config::show(&config, name.as_deref()),
            ConfigCommands::SetDefault { name } => commands::config::set_default(&config, &name),
        },
    }
}
