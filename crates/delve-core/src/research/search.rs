//! Web search contract consumed by the reasoning engine.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How recent search results must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Freshness {
    OneDay,
    OneWeek,
    OneMonth,
    OneYear,
    #[default]
    NoLimit,
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Freshness::OneDay => "oneDay",
            Freshness::OneWeek => "oneWeek",
            Freshness::OneMonth => "oneMonth",
            Freshness::OneYear => "oneYear",
            Freshness::NoLimit => "noLimit",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Freshness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oneday" | "day" => Ok(Freshness::OneDay),
            "oneweek" | "week" => Ok(Freshness::OneWeek),
            "onemonth" | "month" => Ok(Freshness::OneMonth),
            "oneyear" | "year" => Ok(Freshness::OneYear),
            "nolimit" | "any" => Ok(Freshness::NoLimit),
            _ => Err(format!(
                "Invalid freshness '{s}'. Valid options: oneDay, oneWeek, oneMonth, oneYear, noLimit"
            )),
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub site_name: Option<String>,
    pub crawl_date: Option<String>,
}

/// Outcome of a search call. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub success: bool,
    pub query: String,
    pub results: Vec<SearchHit>,
    pub error: Option<String>,
}

impl SearchResult {
    pub fn ok(query: impl Into<String>, results: Vec<SearchHit>) -> Self {
        Self {
            success: true,
            query: query.into(),
            results,
            error: None,
        }
    }

    pub fn failed(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            query: query.into(),
            results: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Numbered listing of hits, 1-based, as shown to the model.
    pub fn render_listing(&self) -> String {
        self.results
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "{}. {}\n   URL: {}\n   Summary: {}",
                    i + 1,
                    hit.title,
                    hit.url,
                    hit.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Boxed future returned by search providers.
pub type SearchFuture<'a> = Pin<Box<dyn Future<Output = SearchResult> + Send + 'a>>;

/// Web search capability.
///
/// Implementations never fail: transport and API errors are reported as
/// `SearchResult { success: false, .. }`.
pub trait SearchProvider: Send + Sync {
    fn search<'a>(&'a self, query: &'a str, freshness: Freshness, count: u32) -> SearchFuture<'a>;
}
