use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use sleuth_core::error::{Result, SleuthError};

use crate::sources::{SearchHit, WebSearch};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Tavily search API.
pub struct TavilySearch {
    api_key: String,
    http: reqwest::Client,
}

impl TavilySearch {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.to_string(),
            http,
        }
    }
}

fn lookup_error(message: impl Into<String>) -> SleuthError {
    SleuthError::Lookup {
        source_name: "tavily".into(),
        message: message.into(),
    }
}

/// Pull hits out of a Tavily response body. Entries without a URL are dropped.
pub(crate) fn parse_hits(body: &serde_json::Value, max_results: usize) -> Vec<SearchHit> {
    body["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    let url = r["url"].as_str().filter(|u| !u.is_empty())?;
                    Some(SearchHit {
                        title: r["title"].as_str().unwrap_or("").to_string(),
                        url: url.to_string(),
                        content: r["content"].as_str().unwrap_or("").to_string(),
                        score: r["score"].as_f64(),
                    })
                })
                .take(max_results)
                .collect()
        })
        .unwrap_or_default()
}

impl WebSearch for TavilySearch {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            debug!(query, max_results, "Tavily search");

            let resp = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": max_results,
                }))
                .send()
                .await
                .map_err(|e| lookup_error(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(lookup_error(format!("HTTP {}", status.as_u16())));
            }

            let body: serde_json::Value =
                resp.json().await.map_err(|e| lookup_error(e.to_string()))?;

            Ok(parse_hits(&body, max_results))
        })
    }
}
