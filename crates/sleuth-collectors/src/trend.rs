use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{info, warn};

use sleuth_core::error::CapabilityError;
use sleuth_core::traits::Capability;
use sleuth_core::types::*;
use sleuth_llm::LlmHandle;

use crate::shaping::{evidence_digest, gather_feeds, research_topic, shape_records};
use crate::sources::{FeedSource, WebSearch};

pub const NAME: &str = "TrendScraper";

const SYSTEM_PROMPT: &str = "You are TrendScraper, a research analyst tracking market \
and developer trends. Use only the evidence you are given. Answer with JSON only.";

/// Gathers news, community and web signals and distills them into a short
/// list of trends, needs or pain points.
pub struct TrendScraper {
    search: Option<Arc<dyn WebSearch>>,
    feeds: Vec<Arc<dyn FeedSource>>,
    llm: Option<LlmHandle>,
    max_results: usize,
    timeout_secs: u64,
}

impl TrendScraper {
    pub fn new(
        search: Option<Arc<dyn WebSearch>>,
        feeds: Vec<Arc<dyn FeedSource>>,
        llm: Option<LlmHandle>,
    ) -> Self {
        Self {
            search,
            feeds,
            llm,
            max_results: 5,
            timeout_secs: 120,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    async fn search_web(&self, topic: &str) -> Vec<Evidence> {
        let Some(search) = &self.search else {
            return vec![];
        };
        match search.search(topic, self.max_results).await {
            Ok(hits) => hits.into_iter().map(|h| h.into_evidence(topic)).collect(),
            Err(e) => {
                warn!(error = %e, "Trend search failed");
                vec![]
            }
        }
    }
}

fn build_prompt(topic: &str, goal: &str, evidence: &[Evidence]) -> String {
    format!(
        "Find the trends relevant to this research task:\n{topic}\n\n\
Overall research goal: {goal}\n\n\
Evidence from news, community discussions and web search:\n{digest}\n\n\
Return a JSON object of the form {{\"trends\": [...]}} with 3-5 key trends, needs or \
pain points. Each trend has: trend_name, short_summary, relevance_score (integer 0-100), \
supporting_sources (list of source URLs from the evidence).",
        digest = evidence_digest(evidence)
    )
}

pub fn fallback_trends() -> Value {
    json!([{
        "trend_name": "AI in Code Review",
        "short_summary": "Increasing use of AI to automate parts of code review, finding bugs, and suggesting improvements.",
        "relevance_score": 90,
        "supporting_sources": ["https://example.com/ai-code-review"]
    }])
}

pub fn fallback_evidence() -> Evidence {
    Evidence::new(
        "AI is being used to automate code reviews, which is a major pain point for developers.",
        "https://example.com/ai-code-review",
        "fallback",
    )
    .with_meta("title", "AI in Code Review")
}

impl Capability for TrendScraper {
    fn name(&self) -> &str {
        NAME
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn run<'a>(
        &'a self,
        task: &'a Task,
        ctx: SharedContext<'a>,
    ) -> BoxFuture<'a, Result<CapabilityOutput, CapabilityError>> {
        Box::pin(async move {
            let topic = research_topic(NAME, task, &ctx)?;
            info!(task_id = %task.id, feeds = self.feeds.len(), "Gathering trends");

            if self.search.is_none() && self.feeds.is_empty() {
                warn!("No trend sources configured");
            }

            let (mut evidence, web) =
                futures::join!(gather_feeds(&self.feeds, topic), self.search_web(topic));
            evidence.extend(web);

            let shaped = match &self.llm {
                Some(llm) => shape_records(
                    llm,
                    SYSTEM_PROMPT,
                    build_prompt(topic, ctx.goal, &evidence),
                    "trends",
                    "trend_name",
                    Some("relevance_score"),
                )
                .await
                .map_err(|e| CapabilityError::failed(NAME, e.to_string()))?,
                None => {
                    warn!("No LLM configured; using fallback trend set");
                    None
                }
            };

            let summary = match shaped {
                Some(records) => Value::Array(records),
                None => {
                    evidence.push(fallback_evidence());
                    fallback_trends()
                }
            };

            info!(task_id = %task.id, evidence = evidence.len(), "Trend analysis done");
            Ok(CapabilityOutput::new(summary, evidence))
        })
    }
}

#[cfg(test)]
mod tests {
    use sleuth_core::error::{Result, SleuthError};
    use sleuth_test_utils::{collector_task, test_model, MockLlm};

    use super::*;

    struct StaticFeed {
        origin: &'static str,
        records: usize,
    }

    impl FeedSource for StaticFeed {
        fn origin(&self) -> &str {
            self.origin
        }

        fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>> {
            Box::pin(async move {
                Ok((0..self.records)
                    .map(|i| {
                        Evidence::new(
                            format!("{query} signal {i}"),
                            format!("https://{}.example/{i}", self.origin),
                            self.origin,
                        )
                    })
                    .collect())
            })
        }
    }

    struct BrokenFeed;

    impl FeedSource for BrokenFeed {
        fn origin(&self) -> &str {
            "news_api"
        }

        fn fetch<'a>(&'a self, _query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>> {
            Box::pin(async {
                Err(SleuthError::Lookup {
                    source_name: "news_api".into(),
                    message: "HTTP 426".into(),
                })
            })
        }
    }

    fn ctx() -> SharedContext<'static> {
        SharedContext {
            goal: "AI code review assistant",
            summaries: &[],
            evidence: &[],
        }
    }

    #[tokio::test]
    async fn test_fallback_adds_fallback_evidence() {
        let scraper = TrendScraper::new(
            None,
            vec![Arc::new(StaticFeed {
                origin: "reddit",
                records: 2,
            })],
            None,
        );
        let task = collector_task("2", NAME);
        let out = scraper.run(&task, ctx()).await.unwrap();

        assert_eq!(out.summary_payload, fallback_trends());
        assert_eq!(out.evidence.len(), 3);
        assert_eq!(out.evidence[2].origin(), Some("fallback"));
        assert_eq!(out.evidence[2].source(), Some("https://example.com/ai-code-review"));
    }

    #[tokio::test]
    async fn test_failed_feed_is_skipped() {
        let answer = r#"[{"trend_name": "Review fatigue", "short_summary": "PR queues grow",
            "relevance_score": 250, "supporting_sources": ["https://reddit.example/0"]}]"#;
        let llm = Arc::new(MockLlm::always(answer));
        let scraper = TrendScraper::new(
            None,
            vec![
                Arc::new(BrokenFeed),
                Arc::new(StaticFeed {
                    origin: "reddit",
                    records: 1,
                }),
            ],
            Some(LlmHandle::new(llm.clone(), test_model())),
        );
        let task = collector_task("2", NAME);
        let out = scraper.run(&task, ctx()).await.unwrap();

        assert_eq!(out.evidence.len(), 1);
        assert_eq!(out.evidence[0].origin(), Some("reddit"));
        assert_eq!(out.summary_payload[0]["trend_name"], "Review fatigue");
        assert_eq!(out.summary_payload[0]["relevance_score"], 100);
        assert!(llm.last_prompt().unwrap().contains("Research step 2 signal 0"));
    }

    #[tokio::test]
    async fn test_empty_topic_fails() {
        let scraper = TrendScraper::new(None, vec![], None);
        let task = Task::new("2", NAME);
        let empty = SharedContext {
            goal: "",
            summaries: &[],
            evidence: &[],
        };
        let err = scraper.run(&task, empty).await.unwrap_err();
        assert_eq!(err.kind(), "capability");
    }
}
