use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::types::Evidence;

use crate::sources::FeedSource;

fn lookup_error(source: &str, message: impl Into<String>) -> SleuthError {
    SleuthError::Lookup {
        source_name: source.to_string(),
        message: message.into(),
    }
}

fn client(timeout_secs: u64, user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

async fn get_json(
    http: &reqwest::Client,
    source: &str,
    url: &str,
) -> Result<serde_json::Value> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| lookup_error(source, e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(lookup_error(source, format!("HTTP {}", status.as_u16())));
    }
    resp.json()
        .await
        .map_err(|e| lookup_error(source, e.to_string()))
}

// ── NewsAPI ──────────────────────────────────────────────────────

/// Latest English-language articles from NewsAPI.
pub struct NewsApiFeed {
    api_key: String,
    page_size: usize,
    http: reqwest::Client,
}

impl NewsApiFeed {
    pub fn new(api_key: &str, page_size: usize) -> Self {
        Self {
            api_key: api_key.to_string(),
            page_size,
            http: client(15, "sleuth/0.1"),
        }
    }

    fn url(&self, query: &str) -> String {
        format!(
            "https://newsapi.org/v2/everything?q={}&sortBy=publishedAt&pageSize={}&language=en&apiKey={}",
            urlencoding::encode(query),
            self.page_size,
            self.api_key
        )
    }
}

pub(crate) fn parse_articles(body: &serde_json::Value, query: &str) -> Vec<Evidence> {
    body["articles"]
        .as_array()
        .map(|articles| {
            articles
                .iter()
                .filter_map(|a| {
                    let url = a["url"].as_str().filter(|u| !u.is_empty())?;
                    let title = a["title"].as_str().unwrap_or("");
                    let description = a["description"].as_str().unwrap_or("");
                    Some(
                        Evidence::new(
                            format!("Title: {title}\nDescription: {description}"),
                            url,
                            "news_api",
                        )
                        .with_meta("title", title)
                        .with_meta("published_at", a["publishedAt"].as_str().unwrap_or(""))
                        .with_meta("query", query),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

impl FeedSource for NewsApiFeed {
    fn origin(&self) -> &str {
        "news_api"
    }

    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>> {
        Box::pin(async move {
            debug!(query, "NewsAPI lookup");
            let body = get_json(&self.http, self.origin(), &self.url(query)).await?;
            Ok(parse_articles(&body, query))
        })
    }
}

// ── Reddit ───────────────────────────────────────────────────────

/// Top posts of the day from one subreddit. The query is not used; the
/// subreddit choice carries the topic.
pub struct RedditFeed {
    subreddit: String,
    limit: usize,
    http: reqwest::Client,
}

impl RedditFeed {
    pub fn new(subreddit: &str, limit: usize) -> Self {
        Self {
            subreddit: subreddit.trim_start_matches("r/").to_string(),
            limit,
            http: client(10, "Mozilla/5.0 (compatible; sleuth/0.1)"),
        }
    }

    fn url(&self) -> String {
        format!(
            "https://www.reddit.com/r/{}/top/.json?limit={}&t=day",
            self.subreddit, self.limit
        )
    }
}

pub(crate) fn parse_listing(body: &serde_json::Value, subreddit: &str) -> Vec<Evidence> {
    body["data"]["children"]
        .as_array()
        .map(|children| {
            children
                .iter()
                .filter_map(|child| {
                    let post = &child["data"];
                    let title = post["title"].as_str()?;
                    let permalink = post["permalink"].as_str().unwrap_or("");
                    Some(
                        Evidence::new(title, format!("https://reddit.com{permalink}"), "reddit")
                            .with_meta("title", title)
                            .with_meta("score", post["score"].as_i64().unwrap_or(0))
                            .with_meta("subreddit", subreddit),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

impl FeedSource for RedditFeed {
    fn origin(&self) -> &str {
        "reddit"
    }

    fn fetch<'a>(&'a self, _query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>> {
        Box::pin(async move {
            debug!(subreddit = %self.subreddit, "Reddit lookup");
            let body = get_json(&self.http, self.origin(), &self.url()).await?;
            Ok(parse_listing(&body, &self.subreddit))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_news_url_encodes_query() {
        let feed = NewsApiFeed::new("k", 5);
        let url = feed.url("AI code review");
        assert!(url.contains("q=AI%20code%20review"));
        assert!(url.contains("pageSize=5"));
        assert!(url.ends_with("apiKey=k"));
    }

    #[test]
    fn test_parse_articles() {
        let body = json!({
            "status": "ok",
            "articles": [
                {"title": "Bots review PRs", "description": "More teams adopt AI review.",
                 "url": "https://news.example/1", "publishedAt": "2026-10-01T10:00:00Z"},
                {"title": "missing url"}
            ]
        });
        let evidence = parse_articles(&body, "code review");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].origin(), Some("news_api"));
        assert!(evidence[0].content.starts_with("Title: Bots review PRs\nDescription:"));
        assert_eq!(evidence[0].metadata["published_at"], json!("2026-10-01T10:00:00Z"));
    }

    #[test]
    fn test_parse_reddit_listing() {
        let body = json!({"data": {"children": [
            {"data": {"title": "Code review is my bottleneck", "score": 812, "permalink": "/r/programming/comments/abc/"}},
            {"data": {"score": 3}}
        ]}});
        let evidence = parse_listing(&body, "programming");
        assert_eq!(evidence.len(), 1);
        assert_eq!(
            evidence[0].source(),
            Some("https://reddit.com/r/programming/comments/abc/")
        );
        assert_eq!(evidence[0].metadata["score"], json!(812));
        assert_eq!(evidence[0].metadata["subreddit"], json!("programming"));
    }

    #[test]
    fn test_reddit_url() {
        let feed = RedditFeed::new("r/rust", 5);
        assert_eq!(feed.url(), "https://www.reddit.com/r/rust/top/.json?limit=5&t=day");
    }
}
