//! Model gateway abstraction and the OpenAI-compatible implementation.

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use crate::config::{Config, ProviderConfig, ProviderKind};

pub mod openai_compat;
pub mod shared;

pub use openai_compat::{OpenAICompatClient, OpenAICompatConfig};
pub use shared::*;

/// Boxed future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

/// Boxed stream of text deltas.
pub type TextStream = BoxStream<'static, ProviderResult<String>>;

/// Text generation capability the reasoning engine depends on.
///
/// Implementors provide `chat`; single-prompt and streaming variants have
/// default implementations built on it.
pub trait ModelGateway: Send + Sync {
    /// Generates a reply to a message history.
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: GenerationParams,
    ) -> GatewayFuture<'a, String>;

    /// Generates a reply to a single user prompt.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: GenerationParams,
    ) -> GatewayFuture<'a, String> {
        Box::pin(async move {
            let messages = [ChatMessage::user(prompt)];
            self.chat(&messages, params).await
        })
    }

    /// Streams a reply as text deltas.
    fn chat_stream<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: GenerationParams,
    ) -> GatewayFuture<'a, TextStream> {
        Box::pin(async move {
            let text = self.chat(messages, params).await?;
            Ok(stream::once(async move { Ok(text) }).boxed())
        })
    }
}

/// Resolves a configured provider into a ready client.
///
/// `provider` defaults to `default_provider`; `model` overrides the
/// configured model.
///
/// # Errors
/// Returns an error for unknown providers or missing credentials.
pub fn build_gateway(
    config: &Config,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<OpenAICompatClient> {
    let name = provider.unwrap_or(&config.default_provider);
    let provider_config = config.provider(name).with_context(|| {
        format!(
            "Unknown provider '{name}'. Configured providers: {}",
            config.provider_names().join(", ")
        )
    })?;
    let resolved = resolve_provider(name, &provider_config, model)?;
    tracing::info!(provider = name, model = %resolved.model, "using model provider");
    Ok(OpenAICompatClient::new(resolved))
}

fn resolve_provider(
    name: &str,
    provider: &ProviderConfig,
    model_override: Option<&str>,
) -> Result<OpenAICompatConfig> {
    let section = format!("providers.{name}");
    let model_override = model_override.map(str::trim).filter(|m| !m.is_empty());

    match provider.effective_kind(name) {
        ProviderKind::OpenAI => {
            let api_key = resolve_api_key(
                provider.effective_api_key(),
                &provider.api_key_env(name),
                &section,
            )?;
            let base_url = resolve_base_url(
                provider.effective_base_url(),
                Some("OPENAI_BASE_URL"),
                openai_compat::DEFAULT_OPENAI_BASE_URL,
                "OpenAI",
            )?;
            let env_model = std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|m| !m.trim().is_empty());
            let model = model_override
                .map(str::to_string)
                .or(env_model)
                .or_else(|| provider.effective_model().map(str::to_string))
                .unwrap_or_else(|| openai_compat::DEFAULT_OPENAI_MODEL.to_string());
            Ok(OpenAICompatConfig {
                api_key,
                base_url,
                model,
                max_tokens: provider.max_tokens,
            })
        }
        ProviderKind::Custom => {
            let Some(configured_url) = provider.effective_base_url() else {
                anyhow::bail!("Provider '{name}' is custom and needs base_url in [{section}].");
            };
            let base_url = resolve_base_url(Some(configured_url), None, configured_url, name)?;
            let api_key = resolve_api_key(
                provider.effective_api_key(),
                &provider.api_key_env(name),
                &section,
            )?;
            let model = model_override
                .or(provider.effective_model())
                .with_context(|| format!("Provider '{name}' needs a model in [{section}]."))?
                .to_string();
            Ok(OpenAICompatConfig {
                api_key,
                base_url,
                model,
                max_tokens: provider.max_tokens,
            })
        }
    }
}
