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

pub const NAME: &str = "TechPaperMiner";

const SYSTEM_PROMPT: &str = "You are TechPaperMiner, a research assistant who reads \
technical papers. Use only the evidence you are given. Answer with JSON only.";

/// Looks up academic papers (arXiv) and technical articles for the
/// technical-feasibility side of the research.
pub struct TechPaperMiner {
    papers: Vec<Arc<dyn FeedSource>>,
    search: Option<Arc<dyn WebSearch>>,
    llm: Option<LlmHandle>,
    max_results: usize,
    timeout_secs: u64,
}

impl TechPaperMiner {
    pub fn new(
        papers: Vec<Arc<dyn FeedSource>>,
        search: Option<Arc<dyn WebSearch>>,
        llm: Option<LlmHandle>,
    ) -> Self {
        Self {
            papers,
            search,
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
                warn!(error = %e, "Paper web search failed");
                vec![]
            }
        }
    }
}

fn build_prompt(topic: &str, goal: &str, evidence: &[Evidence]) -> String {
    format!(
        "Find the technical papers relevant to this research task:\n{topic}\n\n\
Overall research goal: {goal}\n\n\
Evidence from arXiv and technical articles:\n{digest}\n\n\
Return a JSON object of the form {{\"papers\": [...]}}. Each paper has: title, \
authors (list of names), summary, source_url, key_findings (2-3 short strings).",
        digest = evidence_digest(evidence)
    )
}

pub fn fallback_papers(topic: &str) -> Value {
    json!([{
        "title": "A relevant paper for the topic",
        "authors": ["Researcher One", "Researcher Two"],
        "summary": format!("A fallback paper summary related to {topic}."),
        "source_url": "https://example.com/paper.pdf",
        "key_findings": ["Finding A", "Finding B"]
    }])
}

pub fn fallback_evidence(topic: &str) -> Evidence {
    Evidence::new(
        format!(
            "Title: A relevant paper for the topic\nSummary: A fallback paper summary related to {topic}."
        ),
        "https://example.com/paper.pdf",
        "fallback",
    )
    .with_meta("title", "A relevant paper for the topic")
    .with_meta("authors", vec!["Researcher One", "Researcher Two"])
}

impl Capability for TechPaperMiner {
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
            info!(task_id = %task.id, "Mining technical papers");

            let (mut evidence, web) =
                futures::join!(gather_feeds(&self.papers, topic), self.search_web(topic));
            evidence.extend(web);

            let shaped = match &self.llm {
                Some(llm) => shape_records(
                    llm,
                    SYSTEM_PROMPT,
                    build_prompt(topic, ctx.goal, &evidence),
                    "papers",
                    "title",
                    None,
                )
                .await
                .map_err(|e| CapabilityError::failed(NAME, e.to_string()))?,
                None => {
                    warn!("No LLM configured; using fallback paper data");
                    None
                }
            };

            let summary = match shaped {
                Some(records) => Value::Array(records),
                None => {
                    evidence.push(fallback_evidence(topic));
                    fallback_papers(topic)
                }
            };

            info!(task_id = %task.id, evidence = evidence.len(), "Paper mining done");
            Ok(CapabilityOutput::new(summary, evidence))
        })
    }
}

#[cfg(test)]
mod tests {
    use sleuth_core::error::Result;
    use sleuth_test_utils::{collector_task, test_model, MockLlm};

    use super::*;
    use crate::arxiv::ArxivPaper;

    struct OnePaper;

    impl FeedSource for OnePaper {
        fn origin(&self) -> &str {
            "arxiv"
        }

        fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Evidence>>> {
            Box::pin(async move {
                let paper = ArxivPaper {
                    title: "LLM Code Reviewers".into(),
                    summary: "We evaluate reviewers.".into(),
                    authors: vec!["Ada Lovelace".into()],
                    pdf_url: "http://arxiv.org/pdf/2401.00001v1".into(),
                    published_date: "2024-01-02".into(),
                };
                Ok(vec![paper.into_evidence(query)])
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
    async fn test_fallback_paper() {
        let miner = TechPaperMiner::new(vec![], None, None);
        let task = collector_task("3", NAME);
        let out = miner.run(&task, ctx()).await.unwrap();

        assert_eq!(out.summary_payload[0]["title"], "A relevant paper for the topic");
        assert_eq!(
            out.summary_payload[0]["summary"],
            "A fallback paper summary related to Research step 3."
        );
        assert_eq!(out.evidence.len(), 1);
        assert_eq!(out.evidence[0].origin(), Some("fallback"));
        assert_eq!(
            out.evidence[0].metadata["authors"],
            json!(["Researcher One", "Researcher Two"])
        );
    }

    #[tokio::test]
    async fn test_llm_summarizes_papers() {
        let answer = r#"{"papers": [{"title": "LLM Code Reviewers", "authors": ["Ada Lovelace"],
            "summary": "Evaluates reviewers", "source_url": "http://arxiv.org/pdf/2401.00001v1",
            "key_findings": ["Reviewers catch style issues"]}]}"#;
        let llm = Arc::new(MockLlm::always(answer));
        let miner = TechPaperMiner::new(
            vec![Arc::new(OnePaper)],
            None,
            Some(LlmHandle::new(llm.clone(), test_model())),
        );
        let task = collector_task("3", NAME);
        let out = miner.run(&task, ctx()).await.unwrap();

        assert_eq!(out.evidence.len(), 1);
        assert_eq!(out.evidence[0].origin(), Some("arxiv"));
        assert_eq!(out.summary_payload[0]["title"], "LLM Code Reviewers");
        assert!(llm.last_prompt().unwrap().contains("Authors: Ada Lovelace"));
    }
}
