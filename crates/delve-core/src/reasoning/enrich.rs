//! Per-subtask enrichment from web search and page extraction.
//!
//! Enrichment never fails: search and extraction problems are logged and
//! reported as non-fatal `error` events, and the subtask runs with whatever
//! material was gathered.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::Config;
use crate::core::context::{Provenance, ResearchContext};
use crate::core::events::{ErrorKind, ReasoningEvent};
use crate::core::sink::EventSink;
use crate::prompts::{self, SelectUrlsVars};
use crate::providers::{GenerationParams, ModelGateway};
use crate::research::extract::{ContentExtractor, ExtractFormat};
use crate::research::search::{Freshness, SearchProvider, SearchResult};

/// Upper bound on URLs fetched per subtask.
pub const MAX_SELECTED_URLS: usize = 3;

pub const DEFAULT_MAX_CONTENT_CHARS: usize = 4000;

pub const TRUNCATION_MARKER: &str = "...\n[Content truncated due to length]";

/// The selection reply is a short list of indices.
pub const SELECTION_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.3,
    max_tokens: Some(50),
};

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Maps a model's URL selection back to 0-based result indices.
///
/// Numbers are read as 1-based positions. Out-of-range and repeated numbers
/// are skipped and at most `MAX_SELECTED_URLS` indices are returned.
pub fn parse_selection(text: &str, result_count: usize) -> Vec<usize> {
    let mut selected = Vec::new();
    for token in INTEGER.find_iter(text) {
        let Ok(position) = token.as_str().parse::<usize>() else {
            continue;
        };
        if position == 0 || position > result_count {
            continue;
        }
        let index = position - 1;
        if selected.contains(&index) {
            continue;
        }
        selected.push(index);
        if selected.len() == MAX_SELECTED_URLS {
            break;
        }
    }
    selected
}

/// Cuts `content` to `max_chars` characters, appending `TRUNCATION_MARKER`
/// when anything was removed.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

/// Gathers search and extraction material for one subtask.
pub struct Enricher {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ContentExtractor>,
    freshness: Freshness,
    count: u32,
    format: ExtractFormat,
    max_chars: usize,
}

impl Enricher {
    pub fn new(search: Arc<dyn SearchProvider>, extractor: Arc<dyn ContentExtractor>) -> Self {
        Self {
            search,
            extractor,
            freshness: Freshness::default(),
            count: 10,
            format: ExtractFormat::default(),
            max_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }

    /// Applies the `[search]` and `[extract]` settings.
    #[must_use]
    pub fn configured(mut self, config: &Config) -> Self {
        self.freshness = config.search.freshness;
        self.count = config.search.count;
        self.format = config.extract.format;
        self.max_chars = config.extract.max_chars;
        self
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Searches for `query`, picks the most relevant hits with the model and
    /// extracts their content.
    ///
    /// `index` is the subtask position, used for logging only.
    pub async fn enrich(
        &self,
        query: &str,
        index: usize,
        gateway: &dyn ModelGateway,
        sink: &EventSink,
    ) -> ResearchContext {
        let mut material = ResearchContext::new();

        let result = self.search.search(query, self.freshness, self.count).await;
        if !result.success {
            let reason = result.error.as_deref().unwrap_or("unknown error");
            tracing::warn!(subtask = index, query, reason, "web search failed");
            sink.publish(ReasoningEvent::error(
                ErrorKind::Search,
                false,
                format!("Web search failed for subtask {}: {reason}", index + 1),
            ));
            return material;
        }
        if result.results.is_empty() {
            tracing::info!(subtask = index, query, "web search returned no results");
            return material;
        }

        material.push(
            Provenance::Search {
                query: query.to_string(),
            },
            result.render_listing(),
        );

        for url in self.select_urls(gateway, query, &result).await {
            match self.extractor.extract(&url, self.format).await {
                Ok(content) => {
                    tracing::debug!(subtask = index, %url, chars = content.len(), "extracted");
                    material.push(
                        Provenance::Extract { url },
                        truncate_content(&content, self.max_chars),
                    );
                }
                Err(err) => {
                    tracing::warn!(subtask = index, %url, error = %err, "extraction failed");
                    sink.publish(ReasoningEvent::error(
                        ErrorKind::Extraction,
                        false,
                        format!("Could not extract {url}: {err}"),
                    ));
                }
            }
        }

        material
    }

    /// Asks the model which hits to fetch, with a small reply budget. Falls
    /// back to the top hits when the model call or prompt fails.
    pub async fn select_urls(
        &self,
        gateway: &dyn ModelGateway,
        query: &str,
        result: &SearchResult,
    ) -> Vec<String> {
        let fallback = || {
            result
                .results
                .iter()
                .take(MAX_SELECTED_URLS)
                .map(|hit| hit.url.clone())
                .collect::<Vec<_>>()
        };

        let listing = result.render_listing();
        let prompt = match prompts::select_urls(&SelectUrlsVars {
            query,
            listing: &listing,
            max_urls: MAX_SELECTED_URLS,
        }) {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::warn!(error = %err, "failed to render url selection prompt");
                return fallback();
            }
        };

        match gateway.generate(&prompt, SELECTION_PARAMS).await {
            Ok(reply) => parse_selection(&reply, result.results.len())
                .into_iter()
                .map(|i| result.results[i].url.clone())
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "url selection failed, using top results");
                fallback()
            }
        }
    }
}
