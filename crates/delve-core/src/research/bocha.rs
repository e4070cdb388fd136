//! Bocha web search provider.
//!
//! Reads the API key from config, falling back to `BOCHA_API_KEY`.

use serde::{Deserialize, Serialize};

use super::search::{Freshness, SearchFuture, SearchHit, SearchProvider, SearchResult};
use crate::config::SearchConfig;
use crate::providers::{USER_AGENT, classify_reqwest_error, resolve_base_url};

pub const DEFAULT_BOCHA_BASE_URL: &str = "https://api.bochaai.com/v1";
const WEB_SEARCH_PATH: &str = "/web-search";

/// Bocha client configuration.
#[derive(Debug, Clone)]
pub struct BochaConfig {
    /// Missing keys are reported on each search rather than at construction.
    pub api_key: Option<String>,
    pub base_url: String,
}

impl BochaConfig {
    /// Builds the client config from `[search]` plus an optional CLI key.
    ///
    /// Key precedence: override > config > `BOCHA_API_KEY`. The base URL
    /// honours `BOCHA_BASE_URL`.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn from_config(config: &SearchConfig, key_override: Option<&str>) -> anyhow::Result<Self> {
        let api_key = key_override
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or(config.effective_api_key())
            .map(str::to_string)
            .or_else(|| {
                std::env::var("BOCHA_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            });
        let base_url = resolve_base_url(
            config.effective_base_url(),
            Some("BOCHA_BASE_URL"),
            DEFAULT_BOCHA_BASE_URL,
            "Bocha",
        )?;
        Ok(Self { api_key, base_url })
    }
}

pub struct BochaSearch {
    config: BochaConfig,
    http: reqwest::Client,
}

impl BochaSearch {
    pub fn new(config: BochaConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn run(&self, query: &str, freshness: Freshness, count: u32) -> SearchResult {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return SearchResult::failed(query, "BOCHA_API_KEY environment variable not set");
        };

        let request = SearchRequest {
            query,
            freshness,
            summary: true,
            count,
        };
        let url = format!("{}{}", self.config.base_url, WEB_SEARCH_PATH);
        tracing::debug!(%url, query, %freshness, count, "bocha search");

        let response = match self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header("user-agent", USER_AGENT)
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SearchResult::failed(query, classify_reqwest_error(&e).message),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SearchResult::failed(
                query,
                format!("Search API returned HTTP {status}: {}", body.trim()),
            );
        }

        let body: SearchResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                return SearchResult::failed(query, format!("Failed to parse search response: {e}"));
            }
        };

        into_result(query, body)
    }
}

impl SearchProvider for BochaSearch {
    fn search<'a>(&'a self, query: &'a str, freshness: Freshness, count: u32) -> SearchFuture<'a> {
        Box::pin(self.run(query, freshness, count))
    }
}

fn into_result(query: &str, body: SearchResponse) -> SearchResult {
    if let Some(code) = body.code
        && code != 200
    {
        let msg = body.msg.unwrap_or_else(|| "unknown error".to_string());
        return SearchResult::failed(query, format!("Search API error {code}: {msg}"));
    }

    let hits = body
        .data
        .and_then(|d| d.web_pages)
        .map(|p| p.value)
        .unwrap_or_default()
        .into_iter()
        .filter(|page| !page.url.trim().is_empty())
        .map(|page| SearchHit {
            title: if page.name.trim().is_empty() {
                page.url.clone()
            } else {
                page.name
            },
            summary: page.summary.or(page.snippet).unwrap_or_default(),
            url: page.url,
            site_name: page.site_name,
            crawl_date: page.date_last_crawled,
        })
        .collect();

    SearchResult::ok(query, hits)
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    freshness: Freshness,
    summary: bool,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    #[serde(default)]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebPage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    site_name: Option<String>,
    #[serde(default)]
    date_last_crawled: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn search_for(server: &MockServer, api_key: Option<&str>) -> BochaSearch {
        BochaSearch::new(BochaConfig {
            api_key: api_key.map(str::to_string),
            base_url: format!("{}/v1", server.uri()),
        })
    }

    #[tokio::test]
    async fn test_search_maps_web_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/web-search"))
            .and(header("authorization", "Bearer bocha-key"))
            .and(body_partial_json(json!({
                "query": "ocean heat",
                "freshness": "oneYear",
                "summary": true,
                "count": 5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "msg": null,
                "data": {"webPages": {"value": [
                    {
                        "name": "Ocean heat content",
                        "url": "https://example.org/ohc",
                        "summary": "Oceans absorb most excess heat.",
                        "siteName": "Example",
                        "dateLastCrawled": "2025-01-02T00:00:00Z"
                    },
                    {"name": "", "url": "https://example.org/raw", "snippet": "raw snippet"}
                ]}}
            })))
            .mount(&server)
            .await;

        let result = search_for(&server, Some("bocha-key"))
            .search("ocean heat", Freshness::OneYear, 5)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].title, "Ocean heat content");
        assert_eq!(result.results[0].site_name.as_deref(), Some("Example"));
        assert_eq!(result.results[1].title, "https://example.org/raw");
        assert_eq!(result.results[1].summary, "raw snippet");
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_as_failure() {
        let server = MockServer::start().await;
        let result = search_for(&server, None)
            .search("q", Freshness::NoLimit, 10)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("BOCHA_API_KEY"));
    }

    #[tokio::test]
    async fn test_http_error_is_reported_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/web-search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let result = search_for(&server, Some("k"))
            .search("q", Freshness::NoLimit, 10)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("403"));
    }

    #[test]
    fn test_api_error_code_is_failure() {
        let body: SearchResponse =
            serde_json::from_value(json!({"code": 401, "msg": "Invalid key"})).unwrap();
        let result = into_result("q", body);
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Search API error 401: Invalid key")
        );
    }
}
