//! OpenAI-compatible Chat Completions client.
//!
//! Works against api.openai.com and any server exposing the same
//! `/chat/completions` shape (custom providers).

use eventsource_stream::Eventsource;
use futures_util::{StreamExt, future};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    ChatMessage, GatewayFuture, GenerationParams, ModelGateway, ProviderError, ProviderResult,
    TextStream, USER_AGENT, classify_reqwest_error,
};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// OpenAI-compatible chat completions configuration.
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Used when a call does not set its own `max_tokens`.
    pub max_tokens: Option<u32>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAICompatClient {
    config: OpenAICompatConfig,
    http: reqwest::Client,
}

impl OpenAICompatClient {
    pub fn new(config: OpenAICompatConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn post(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
        stream: bool,
    ) -> ProviderResult<reqwest::Response> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens.or(self.config.max_tokens),
            stream,
        };

        let url = format!("{}{}", self.config.base_url, CHAT_COMPLETIONS_PATH);
        tracing::debug!(%url, model = %self.config.model, stream, "sending chat completion");

        let response = self
            .http
            .post(&url)
            .headers(build_headers(&self.config.api_key, stream))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &error_body));
        }
        Ok(response)
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> ProviderResult<String> {
        let response = self.post(messages, params, false).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("Failed to parse completion JSON: {e}")))?;
        parse_completion(&body)
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> ProviderResult<TextStream> {
        let response = self.post(messages, params, true).await?;
        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(ev) if ev.data.trim() == "[DONE]"))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(ev) => parse_delta(&ev.data).transpose(),
                    Err(e) => Some(Err(ProviderError::parse(format!("SSE stream error: {e}")))),
                })
            });
        Ok(stream.boxed())
    }
}

impl ModelGateway for OpenAICompatClient {
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: GenerationParams,
    ) -> GatewayFuture<'a, String> {
        Box::pin(self.complete(messages, params))
    }

    fn chat_stream<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: GenerationParams,
    ) -> GatewayFuture<'a, TextStream> {
        Box::pin(self.complete_stream(messages, params))
    }
}

fn build_headers(api_key: &str, stream: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert(
        "accept",
        HeaderValue::from_static(if stream {
            "text/event-stream"
        } else {
            "application/json"
        }),
    );
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    headers
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn api_error_from(value: &Value) -> Option<ProviderError> {
    let error = value.get("error")?;
    let parsed: ApiError = serde_json::from_value(error.clone()).unwrap_or(ApiError {
        error_type: None,
        message: error.as_str().map(str::to_string),
    });
    Some(ProviderError::api_error(
        parsed.error_type.as_deref().unwrap_or("error"),
        parsed.message.as_deref().unwrap_or("Unknown error"),
    ))
}

/// Extracts `choices[0].message.content` from a non-streaming response.
fn parse_completion(body: &Value) -> ProviderResult<String> {
    if let Some(err) = api_error_from(body) {
        return Err(err);
    }
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ProviderError::parse("Response contained no choices"))?;
    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(content.to_string())
}

/// Extracts the text delta from one SSE data payload.
fn parse_delta(data: &str) -> ProviderResult<Option<String>> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::parse(format!("Failed to parse SSE JSON: {e}")))?;
    if let Some(err) = api_error_from(&value) {
        return Err(err);
    }
    Ok(value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}
