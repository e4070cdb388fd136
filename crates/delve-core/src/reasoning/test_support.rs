//! Scripted collaborators for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::events::ReasoningEvent;
use crate::core::sink::EventRx;
use crate::providers::{
    ChatMessage, GatewayFuture, GenerationParams, ModelGateway, ProviderError, ProviderResult,
};
use crate::research::extract::{ContentExtractor, ExtractFormat, ExtractFuture};
use crate::research::search::{Freshness, SearchFuture, SearchHit, SearchProvider, SearchResult};

/// Replays canned responses in call order and records every prompt.
#[derive(Default)]
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<ProviderResult<String>>>,
    prompts: Mutex<Vec<(String, GenerationParams)>>,
    delay: Option<Duration>,
    cancel_on: Option<(String, CancellationToken)>,
}

impl ScriptedGateway {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn from_results(responses: Vec<ProviderResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Sleeps before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancels `token` when a prompt containing `marker` arrives.
    pub fn cancel_on(mut self, marker: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((marker.to_string(), token));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.params().iter().map(|p| p.temperature).collect()
    }

    pub fn params(&self) -> Vec<GenerationParams> {
        self.prompts.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

impl ModelGateway for ScriptedGateway {
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: GenerationParams,
    ) -> GatewayFuture<'a, String> {
        Box::pin(async move {
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            if let Some((marker, token)) = &self.cancel_on
                && prompt.contains(marker.as_str())
            {
                token.cancel();
            }
            self.prompts
                .lock()
                .unwrap()
                .push((prompt, params));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::parse("script exhausted")))
        })
    }
}

pub fn gateway(gateway: ScriptedGateway) -> Arc<ScriptedGateway> {
    Arc::new(gateway)
}

/// Returns a fixed result and records the queries.
pub struct StaticSearch {
    pub result: SearchResult,
    pub queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(result: SearchResult) -> Self {
        Self {
            result,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_urls(urls: &[&str]) -> Self {
        let hits = urls
            .iter()
            .enumerate()
            .map(|(i, url)| SearchHit {
                url: (*url).to_string(),
                title: format!("Result {}", i + 1),
                summary: format!("Summary {}", i + 1),
                site_name: None,
                crawl_date: None,
            })
            .collect();
        Self::new(SearchResult::ok("query", hits))
    }
}

impl SearchProvider for StaticSearch {
    fn search<'a>(&'a self, query: &'a str, _: Freshness, _: u32) -> SearchFuture<'a> {
        self.queries.lock().unwrap().push(query.to_string());
        let mut result = self.result.clone();
        result.query = query.to_string();
        Box::pin(async move { result })
    }
}

/// Serves page bodies by URL; unknown URLs fail.
pub struct MapExtractor {
    pages: Vec<(String, String)>,
    pub requested: Mutex<Vec<String>>,
}

impl MapExtractor {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, c)| ((*u).to_string(), (*c).to_string()))
                .collect(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl ContentExtractor for MapExtractor {
    fn extract<'a>(&'a self, url: &'a str, _: ExtractFormat) -> ExtractFuture<'a> {
        self.requested.lock().unwrap().push(url.to_string());
        let page = self
            .pages
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, c)| c.clone());
        Box::pin(async move {
            page.ok_or_else(|| ProviderError::http_status(404, "not found"))
        })
    }
}

/// Drains every event currently buffered on `rx`.
pub fn drain(rx: &mut EventRx) -> Vec<Arc<ReasoningEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn names(events: &[Arc<ReasoningEvent>]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}
