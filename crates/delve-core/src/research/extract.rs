//! URL content extraction.
//!
//! Two extractors are available:
//! - `DirectExtractor` fetches the page and converts HTML locally.
//! - `ParallelExtractor` uses the Parallel extract API (`PARALLEL_API_KEY`).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::config::{ExtractConfig, ExtractProvider};
use crate::providers::{
    ProviderError, ProviderErrorKind, ProviderResult, USER_AGENT, classify_reqwest_error,
};

const PARALLEL_EXTRACT_URL: &str = "https://api.parallel.ai/v1beta/extract";
const PARALLEL_BETA_HEADER: &str = "search-extract-2025-10-10";

/// Output format of extracted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractFormat {
    #[default]
    Markdown,
    Text,
    Html,
}

impl fmt::Display for ExtractFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractFormat::Markdown => write!(f, "markdown"),
            ExtractFormat::Text => write!(f, "text"),
            ExtractFormat::Html => write!(f, "html"),
        }
    }
}

impl FromStr for ExtractFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExtractFormat::Markdown),
            "text" | "txt" => Ok(ExtractFormat::Text),
            "html" => Ok(ExtractFormat::Html),
            _ => Err(format!(
                "Unsupported output format '{s}'. Valid options: markdown, text, html"
            )),
        }
    }
}

/// Boxed future returned by extractors.
pub type ExtractFuture<'a> = Pin<Box<dyn Future<Output = ProviderResult<String>> + Send + 'a>>;

/// Page content extraction capability. Failures are per URL.
pub trait ContentExtractor: Send + Sync {
    fn extract<'a>(&'a self, url: &'a str, format: ExtractFormat) -> ExtractFuture<'a>;
}

/// Builds the extractor selected in `[extract]`.
///
/// # Errors
/// Returns an error if `parallel` is selected without an API key.
pub fn build_extractor(config: &ExtractConfig) -> anyhow::Result<Arc<dyn ContentExtractor>> {
    match config.provider {
        ExtractProvider::Direct => Ok(Arc::new(DirectExtractor::new())),
        ExtractProvider::Parallel => {
            let api_key = crate::providers::resolve_api_key(
                config.effective_api_key(),
                "PARALLEL_API_KEY",
                "extract",
            )?;
            Ok(Arc::new(ParallelExtractor::new(api_key)))
        }
    }
}

// ============================================================================
// Direct fetch
// ============================================================================

/// Fetches pages over HTTP and converts the HTML locally.
pub struct DirectExtractor {
    http: reqwest::Client,
}

impl Default for DirectExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectExtractor {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, url: &str, format: ExtractFormat) -> ProviderResult<String> {
        url::Url::parse(url).map_err(|e| {
            ProviderError::new(ProviderErrorKind::Config, format!("Invalid URL {url}: {e}"))
        })?;

        let response = self
            .http
            .get(url)
            .header("user-agent", USER_AGENT)
            .header("accept", "text/html,application/xhtml+xml,text/plain;q=0.9")
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &body));
        }

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !is_html {
            return Ok(body);
        }
        Ok(match format {
            ExtractFormat::Html => body,
            ExtractFormat::Text => html_to_text(&body),
            ExtractFormat::Markdown => html_to_markdown(&body),
        })
    }
}

impl ContentExtractor for DirectExtractor {
    fn extract<'a>(&'a self, url: &'a str, format: ExtractFormat) -> ExtractFuture<'a> {
        Box::pin(self.fetch(url, format))
    }
}

static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<head\b.*?</head\s*>|<!--.*?-->",
    )
    .expect("valid regex")
});
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid regex")
});
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)
        .expect("valid regex")
});
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"));
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?(p|div|tr|ul|ol|section|article|table|blockquote)\b[^>]*>|</li\s*>")
        .expect("valid regex")
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));
static EXTRA_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn strip_tags(fragment: &str) -> String {
    ANY_TAG.replace_all(fragment, "").into_owned()
}

fn normalize_whitespace(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    let lines: Vec<String> = decoded
        .lines()
        .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
        .collect();
    EXTRA_NEWLINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Converts HTML to readable plain text.
pub fn html_to_text(html: &str) -> String {
    let text = HIDDEN_BLOCKS.replace_all(html, "");
    let text = HEADING.replace_all(&text, |caps: &Captures| {
        format!("\n\n{}\n\n", strip_tags(&caps[2]).trim())
    });
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    normalize_whitespace(&ANY_TAG.replace_all(&text, ""))
}

/// Converts HTML to lightweight markdown (headings, links, list items).
pub fn html_to_markdown(html: &str) -> String {
    let text = HIDDEN_BLOCKS.replace_all(html, "");
    let text = HEADING.replace_all(&text, |caps: &Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!(
            "\n\n{} {}\n\n",
            "#".repeat(level),
            strip_tags(&caps[2]).trim()
        )
    });
    let text = LINK.replace_all(&text, |caps: &Captures| {
        let label = strip_tags(&caps[2]);
        let label = label.trim();
        let href = &caps[1];
        if label.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            label.to_string()
        } else {
            format!("[{label}]({href})")
        }
    });
    let text = LIST_ITEM.replace_all(&text, "\n- ");
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    normalize_whitespace(&ANY_TAG.replace_all(&text, ""))
}

// ============================================================================
// Parallel extract API
// ============================================================================

/// Extracts page content through the Parallel extract API.
pub struct ParallelExtractor {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl ParallelExtractor {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, PARALLEL_EXTRACT_URL.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        Self {
            api_key,
            endpoint,
            http: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, url: &str, format: ExtractFormat) -> ProviderResult<String> {
        if format == ExtractFormat::Html {
            return Err(ProviderError::new(
                ProviderErrorKind::Config,
                "Parallel extract does not support html output",
            ));
        }

        let request = ParallelRequest {
            urls: vec![url.to_string()],
            objective: "Extract the main content of the page",
            excerpts: false,
            full_content: true,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("parallel-beta", PARALLEL_BETA_HEADER)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &body));
        }

        let body: ParallelResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("Failed to parse extract response: {e}")))?;
        if !body.errors.is_empty() {
            return Err(ProviderError::new(
                ProviderErrorKind::ApiError,
                format!("Extract API returned errors: {}", body.errors.join("; ")),
            ));
        }

        let content = body
            .results
            .into_iter()
            .next()
            .and_then(|r| r.full_content.or_else(|| r.excerpts.map(|e| e.join("\n\n"))))
            .ok_or_else(|| ProviderError::parse(format!("No content extracted from {url}")))?;

        Ok(match format {
            ExtractFormat::Text => markdown_to_text(&content),
            _ => content,
        })
    }
}

impl ContentExtractor for ParallelExtractor {
    fn extract<'a>(&'a self, url: &'a str, format: ExtractFormat) -> ExtractFuture<'a> {
        Box::pin(self.fetch(url, format))
    }
}

static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static MD_LINE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}(#{1,6}\s+|>\s?)").expect("valid regex"));
static MD_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__|`)").expect("valid regex"));

fn markdown_to_text(markdown: &str) -> String {
    let text = MD_LINK.replace_all(markdown, "$1");
    let text = MD_LINE_PREFIX.replace_all(&text, "");
    MD_EMPHASIS.replace_all(&text, "").trim().to_string()
}

#[derive(Debug, Serialize)]
struct ParallelRequest<'a> {
    urls: Vec<String>,
    objective: &'a str,
    excerpts: bool,
    full_content: bool,
}

#[derive(Debug, Deserialize)]
struct ParallelResponse {
    #[serde(default)]
    results: Vec<ParallelResult>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ParallelResult {
    #[serde(default)]
    excerpts: Option<Vec<String>>,
    #[serde(default)]
    full_content: Option<String>,
}
