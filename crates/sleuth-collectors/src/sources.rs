use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use sleuth_core::error::Result;
use sleuth_core::types::Evidence;

/// One web search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SearchHit {
    pub fn into_evidence(self, query: &str) -> Evidence {
        let mut evidence = Evidence::new(self.content, self.url, "tavily")
            .with_meta("title", self.title)
            .with_meta("query", query);
        if let Some(score) = self.score {
            evidence = evidence.with_meta("score", score);
        }
        evidence
    }
}

/// Web search backend.
pub trait WebSearch: Send + Sync + 'static {
    fn search<'a>(&'a self, query: &'a str, max_results: usize)
        -> BoxFuture<'a, Result<Vec<SearchHit>>>;
}

/// Fetches a page and returns its readable text.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch_text<'a>(&'a self, url: &'a str, max_chars: usize) -> BoxFuture<'a, Result<String>>;
}

/// A feed that turns a query into evidence records directly
/// (news, community posts, paper indexes).
pub trait FeedSource: Send + Sync + 'static {
    /// Origin tag stamped on every evidence record.
    fn origin(&self) -> &str;

    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>>;
}
