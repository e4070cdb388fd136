//! Config command handlers.

use anyhow::{Context, Result};
use delve_core::config::{self, Config, ProviderKind};
use delve_core::providers::openai_compat::DEFAULT_OPENAI_BASE_URL;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn list(config: &Config) {
    for name in config.provider_names() {
        let marker = if name == config.default_provider { "*" } else { " " };
        let model = config
            .provider(&name)
            .and_then(|p| p.effective_model().map(str::to_string))
            .unwrap_or_else(|| "-".to_string());
        println!("{marker} {name} ({model})");
    }
}

/// Prints a provider's settings. The API key itself is never printed.
pub fn show(config: &Config, name: Option<&str>) -> Result<()> {
    let name = name.unwrap_or(&config.default_provider);
    let provider = config.provider(name).with_context(|| {
        format!(
            "Unknown provider '{name}'. Configured providers: {}",
            config.provider_names().join(", ")
        )
    })?;

    let kind = provider.effective_kind(name);
    let base_url = match (provider.effective_base_url(), kind) {
        (Some(url), _) => url.to_string(),
        (None, ProviderKind::OpenAI) => DEFAULT_OPENAI_BASE_URL.to_string(),
        (None, ProviderKind::Custom) => "(not set)".to_string(),
    };
    let key_env = provider.api_key_env(name);
    let key_status = if provider.effective_api_key().is_some() {
        "set in config".to_string()
    } else if std::env::var(&key_env).is_ok_and(|k| !k.trim().is_empty()) {
        format!("set via {key_env}")
    } else {
        format!("missing (set api_key or {key_env})")
    };
    let kind = match kind {
        ProviderKind::OpenAI => "openai",
        ProviderKind::Custom => "custom",
    };

    println!("name:     {name}");
    println!("kind:     {kind}");
    println!("model:    {}", provider.effective_model().unwrap_or("(not set)"));
    println!("base_url: {base_url}");
    println!("api_key:  {key_status}");
    if let Some(max_tokens) = provider.max_tokens {
        println!("max_tokens: {max_tokens}");
    }
    Ok(())
}

pub fn set_default(config: &Config, name: &str) -> Result<()> {
    if config.provider(name).is_none() {
        anyhow::bail!(
            "Unknown provider '{name}'. Configured providers: {}",
            config.provider_names().join(", ")
        );
    }
    Config::save_default_provider(name).context("save default provider")?;
    println!("Default provider set to '{name}'");
    Ok(())
}
