use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use sleuth_core::error::CapabilityError;
use sleuth_core::traits::Capability;
use sleuth_core::types::*;
use sleuth_llm::LlmHandle;

use crate::shaping::{evidence_digest, research_topic, shape_records};
use crate::sources::{PageFetcher, WebSearch};

pub const NAME: &str = "CompetitorScout";

const SYSTEM_PROMPT: &str = "You are CompetitorScout, a market intelligence analyst. \
Ground every claim in the evidence you are given. Answer with JSON only.";

#[derive(Debug, Clone)]
pub struct CompetitorSettings {
    /// Search hits requested per task.
    pub max_results: usize,
    /// How many of the top hits get scraped.
    pub max_pages: usize,
    pub scrape_max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for CompetitorSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_pages: 3,
            scrape_max_chars: 8000,
            timeout_secs: 120,
        }
    }
}

/// Finds existing products similar to the idea: search, scrape the top
/// result pages, then ask the model for a structured competitor list.
pub struct CompetitorScout {
    search: Option<Arc<dyn WebSearch>>,
    fetcher: Arc<dyn PageFetcher>,
    llm: Option<LlmHandle>,
    settings: CompetitorSettings,
}

impl CompetitorScout {
    pub fn new(
        search: Option<Arc<dyn WebSearch>>,
        fetcher: Arc<dyn PageFetcher>,
        llm: Option<LlmHandle>,
        settings: CompetitorSettings,
    ) -> Self {
        Self {
            search,
            fetcher,
            llm,
            settings,
        }
    }

    async fn collect_evidence(&self, topic: &str) -> Vec<Evidence> {
        let Some(search) = &self.search else {
            warn!("No search API key configured; competitor search skipped");
            return vec![];
        };

        let hits = match search.search(topic, self.settings.max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Competitor search failed");
                return vec![];
            }
        };

        let urls: Vec<String> = hits
            .iter()
            .take(self.settings.max_pages)
            .map(|h| h.url.clone())
            .collect();
        let mut evidence: Vec<Evidence> =
            hits.into_iter().map(|h| h.into_evidence(topic)).collect();

        let pages = join_all(
            urls.iter()
                .map(|url| self.fetcher.fetch_text(url, self.settings.scrape_max_chars)),
        )
        .await;

        for (url, page) in urls.iter().zip(pages) {
            match page {
                Ok(text) if !text.trim().is_empty() => evidence.push(
                    Evidence::new(text, url.as_str(), "web_scraper")
                        .with_meta("title", format!("Scraped content from {url}")),
                ),
                Ok(_) => debug!(url = %url, "Scraped page was empty"),
                Err(e) => warn!(url = %url, error = %e, "Scrape failed"),
            }
        }

        evidence
    }
}

fn build_prompt(topic: &str, goal: &str, evidence: &[Evidence]) -> String {
    format!(
        "Analyze competitors for this startup research task:\n{topic}\n\n\
Overall research goal: {goal}\n\n\
Evidence collected from search results and competitor websites:\n{digest}\n\n\
Return a JSON object of the form {{\"competitors\": [...]}}. Each competitor has: \
name, domain, summary, website, reason_for_similarity, \
estimated_similarity_score (integer 0-100), key_features (list of strings), \
pricing_model, target_audience. Prefer companies that appear in the evidence.",
        digest = evidence_digest(evidence)
    )
}

/// Fixed list used when no model is available or its answer is unusable.
pub fn fallback_competitors(topic: &str) -> Value {
    json!([
        {
            "name": "GitGuardian",
            "domain": "Code Security",
            "summary": "Focuses on secrets detection...",
            "website": "https://www.gitguardian.com",
            "reason_for_similarity": format!("Focuses on code security like '{topic}'."),
            "estimated_similarity_score": 85,
            "key_features": ["Secrets detection"],
            "pricing_model": "Freemium",
            "target_audience": "Developers"
        },
        {
            "name": "SonarQube",
            "domain": "Code Quality Analysis",
            "summary": "Static code analysis for quality...",
            "website": "https://www.sonarsource.com",
            "reason_for_similarity": format!("Performs static code analysis like '{topic}'."),
            "estimated_similarity_score": 90,
            "key_features": ["Static code analysis"],
            "pricing_model": "Open Source",
            "target_audience": "Enterprise DevOps Teams"
        }
    ])
}

impl Capability for CompetitorScout {
    fn name(&self) -> &str {
        NAME
    }

    fn timeout_secs(&self) -> u64 {
        self.settings.timeout_secs
    }

    fn run<'a>(
        &'a self,
        task: &'a Task,
        ctx: SharedContext<'a>,
    ) -> BoxFuture<'a, Result<CapabilityOutput, CapabilityError>> {
        Box::pin(async move {
            let topic = research_topic(NAME, task, &ctx)?;
            info!(task_id = %task.id, "Analyzing competitors");

            let evidence = self.collect_evidence(topic).await;

            let summary = match &self.llm {
                Some(llm) => {
                    let prompt = build_prompt(topic, ctx.goal, &evidence);
                    let records = shape_records(
                        llm,
                        SYSTEM_PROMPT,
                        prompt,
                        "competitors",
                        "name",
                        Some("estimated_similarity_score"),
                    )
                    .await
                    .map_err(|e| CapabilityError::failed(NAME, e.to_string()))?;
                    match records {
                        Some(records) => Value::Array(records),
                        None => fallback_competitors(topic),
                    }
                }
                None => {
                    warn!("No LLM configured; using fallback competitor list");
                    fallback_competitors(topic)
                }
            };

            info!(task_id = %task.id, evidence = evidence.len(), "Competitor analysis done");
            Ok(CapabilityOutput::new(summary, evidence))
        })
    }
}
