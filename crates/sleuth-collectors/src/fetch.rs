use std::sync::OnceLock;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use sleuth_core::error::{Result, SleuthError};

use crate::sources::PageFetcher;

/// Plain HTTP page fetcher with HTML stripping.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; sleuth/0.1)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup_error(message: impl Into<String>) -> SleuthError {
    SleuthError::Lookup {
        source_name: "web_scraper".into(),
        message: message.into(),
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch_text<'a>(&'a self, url: &'a str, max_chars: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            debug!(url, "Fetching page");

            let resp = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| lookup_error(format!("{url}: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(lookup_error(format!("{url}: HTTP {}", status.as_u16())));
            }

            let is_html = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.contains("html"))
                .unwrap_or(false);

            let body = resp
                .text()
                .await
                .map_err(|e| lookup_error(format!("{url}: {e}")))?;

            let text = if is_html || body.trim_start().starts_with('<') {
                strip_html_tags(&body)
            } else {
                body
            };

            Ok(truncate_chars(&text, max_chars))
        })
    }
}

struct HtmlPatterns {
    script: Regex,
    style: Regex,
    head: Regex,
    tags: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        script: Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script pattern"),
        style: Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style pattern"),
        head: Regex::new(r"(?is)<head[^>]*>.*?</head>").expect("head pattern"),
        tags: Regex::new(r"<[^>]+>").expect("tag pattern"),
        spaces: Regex::new(r"[ \t]+").expect("space pattern"),
        blank_lines: Regex::new(r"\n\s*\n+").expect("blank line pattern"),
    })
}

/// Reduce an HTML document to readable text.
pub fn strip_html_tags(html: &str) -> String {
    let p = html_patterns();
    let cleaned = p.script.replace_all(html, "");
    let cleaned = p.style.replace_all(&cleaned, "");
    let cleaned = p.head.replace_all(&cleaned, "");
    let text = p.tags.replace_all(&cleaned, " ");

    let text = decode_entities(&text);
    let text = p.spaces.replace_all(&text, " ");
    let text = p.blank_lines.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        let html = r#"<html><head><title>x</title><style>p{}</style></head>
<body><script>var a = 1;</script><h1>Review&nbsp;Bot</h1>
<p>Finds   bugs &amp; smells.</p></body></html>"#;
        let text = strip_html_tags(html);
        assert!(text.contains("Review Bot"));
        assert!(text.contains("Finds bugs & smells."));
        assert!(!text.contains("var a"));
        assert!(!text.contains("p{}"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_entity_order() {
        // &amp;lt; must decode to the literal "&lt;", not "<"
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }
}
