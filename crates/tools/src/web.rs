//! Web search via the DuckDuckGo instant-answer API.
//!
//! Search never fails the turn: any transport or decode error degrades to a
//! stub result so the model can keep going on its own knowledge.

use std::time::Duration;

use intervet_config::WebSearchConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Clone)]
pub struct WebSearchClient {
    http: reqwest::Client,
    endpoint: String,
}

impl WebSearchClient {
    pub fn new(config: &WebSearchConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Run an instant-answer query. Always returns at least one result.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<WebSearchResult> {
        match self.try_search(query, top_k).await {
            Ok(results) => results,
            Err(e) => {
                debug!("web search failed, using stub: {e}");
                vec![stub_result(query)]
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<WebSearchResult>, reqwest::Error> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_redirect", "1"),
                ("no_html", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let data: Value = response.json().await?;
        Ok(parse_instant_answer(&data, query, top_k))
    }
}

/// Extract related topics from an instant-answer payload. When nothing
/// matches, a single "no results" entry tells the model to rely on its own
/// knowledge.
fn parse_instant_answer(data: &Value, query: &str, top_k: usize) -> Vec<WebSearchResult> {
    let mut results = Vec::new();
    if let Some(topics) = data.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics {
            if let (Some(text), Some(url)) = (
                topic.get("Text").and_then(Value::as_str),
                topic.get("FirstURL").and_then(Value::as_str),
            ) {
                results.push(WebSearchResult {
                    title: text.chars().take(TITLE_CHARS).collect(),
                    url: url.to_string(),
                    snippet: text.to_string(),
                });
            }
            if results.len() >= top_k {
                break;
            }
        }
    }
    if results.is_empty() {
        results.push(WebSearchResult {
            title: "Результаты не найдены".into(),
            url: String::new(),
            snippet: format!(
                "По запросу нет точных совпадений; опираемся на знания модели. Запрос: {query}"
            ),
        });
    }
    results
}

fn stub_result(query: &str) -> WebSearchResult {
    WebSearchResult {
        title: "stub result".into(),
        url: "https://example.com".into(),
        snippet: format!("No external search, query='{query}'"),
    }
}
