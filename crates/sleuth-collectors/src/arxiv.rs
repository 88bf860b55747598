use std::sync::OnceLock;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::types::Evidence;

use crate::fetch::decode_entities;
use crate::sources::FeedSource;

const ARXIV_API: &str = "http://export.arxiv.org/api/query";

/// arXiv search over the public Atom API, ranked by relevance.
pub struct ArxivFeed {
    max_results: usize,
    http: reqwest::Client,
}

impl ArxivFeed {
    pub fn new(max_results: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { max_results, http }
    }

    fn url(&self, query: &str) -> String {
        format!(
            "{}?search_query=all:{}&start=0&max_results={}&sortBy=relevance",
            ARXIV_API,
            urlencoding::encode(query),
            self.max_results
        )
    }
}

/// One paper entry from an Atom feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArxivPaper {
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub pdf_url: String,
    pub published_date: String,
}

impl ArxivPaper {
    pub fn into_evidence(self, query: &str) -> Evidence {
        let content = format!(
            "Title: {}\nAuthors: {}\nSummary: {}",
            self.title,
            self.authors.join(", "),
            self.summary
        );
        Evidence::new(content, self.pdf_url, "arxiv")
            .with_meta("title", self.title)
            .with_meta("authors", self.authors)
            .with_meta("published_date", self.published_date)
            .with_meta("query", query)
    }
}

struct AtomPatterns {
    entry: Regex,
    title: Regex,
    summary: Regex,
    published: Regex,
    id: Regex,
    author: Regex,
    link: Regex,
    href: Regex,
    space: Regex,
}

fn atom() -> &'static AtomPatterns {
    static PATTERNS: OnceLock<AtomPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| AtomPatterns {
        entry: Regex::new(r"(?s)<entry>(.*?)</entry>").expect("entry pattern"),
        title: Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("title pattern"),
        summary: Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").expect("summary pattern"),
        published: Regex::new(r"<published>([^<]*)</published>").expect("published pattern"),
        id: Regex::new(r"<id>([^<]*)</id>").expect("id pattern"),
        author: Regex::new(r"(?s)<author>\s*<name>(.*?)</name>").expect("author pattern"),
        link: Regex::new(r"<link\s[^>]*>").expect("link pattern"),
        href: Regex::new(r#"href="([^"]+)""#).expect("href pattern"),
        space: Regex::new(r"\s+").expect("space pattern"),
    })
}

fn clean(p: &AtomPatterns, raw: &str) -> String {
    decode_entities(p.space.replace_all(raw, " ").trim())
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|c| c[1].to_string())
}

/// Parse the entries of an arXiv Atom response. Entries without a title
/// are skipped; the PDF link falls back to the abstract id.
pub fn parse_feed(xml: &str) -> Vec<ArxivPaper> {
    let p = atom();
    p.entry
        .captures_iter(xml)
        .filter_map(|entry| {
            let body = &entry[1];
            let title = clean(p, &capture(&p.title, body)?);
            if title.is_empty() {
                return None;
            }
            let summary = capture(&p.summary, body)
                .map(|s| clean(p, &s))
                .unwrap_or_default();
            let authors = p
                .author
                .captures_iter(body)
                .map(|c| clean(p, &c[1]))
                .collect();
            let pdf_url = p
                .link
                .find_iter(body)
                .map(|m| m.as_str())
                .find(|tag| tag.contains(r#"title="pdf""#))
                .and_then(|tag| capture(&p.href, tag))
                .or_else(|| capture(&p.id, body))
                .unwrap_or_default();
            let published_date = capture(&p.published, body)
                .map(|d| d.chars().take(10).collect::<String>())
                .unwrap_or_default();

            Some(ArxivPaper {
                title,
                summary,
                authors,
                pdf_url,
                published_date,
            })
        })
        .collect()
}

impl FeedSource for ArxivFeed {
    fn origin(&self) -> &str {
        "arxiv"
    }

    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>> {
        Box::pin(async move {
            debug!(query, max_results = self.max_results, "arXiv lookup");

            let lookup_error = |message: String| SleuthError::Lookup {
                source_name: "arxiv".into(),
                message,
            };

            let resp = self
                .http
                .get(self.url(query))
                .send()
                .await
                .map_err(|e| lookup_error(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(lookup_error(format!("HTTP {}", status.as_u16())));
            }
            let xml = resp.text().await.map_err(|e| lookup_error(e.to_string()))?;

            Ok(parse_feed(&xml)
                .into_iter()
                .take(self.max_results)
                .map(|paper| paper.into_evidence(query))
                .collect())
        })
    }
}
