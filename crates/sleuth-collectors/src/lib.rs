pub mod arxiv;
pub mod competitor;
pub mod feeds;
pub mod fetch;
pub mod paper;
pub mod search;
pub mod shaping;
pub mod sources;
pub mod trend;

use std::sync::Arc;

use tracing::{info, warn};

use sleuth_core::config::AppConfig;
use sleuth_llm::LlmHandle;

pub use arxiv::ArxivFeed;
pub use competitor::{CompetitorScout, CompetitorSettings};
pub use feeds::{NewsApiFeed, RedditFeed};
pub use fetch::HttpFetcher;
pub use paper::TechPaperMiner;
pub use search::TavilySearch;
pub use sources::{FeedSource, PageFetcher, SearchHit, WebSearch};
pub use trend::TrendScraper;

/// The three collectors, wired to live sources from configuration.
pub struct CollectorSet {
    pub competitor: CompetitorScout,
    pub trend: TrendScraper,
    pub paper: TechPaperMiner,
}

impl CollectorSet {
    pub fn from_config(config: &AppConfig, llm: Option<LlmHandle>) -> Self {
        let search: Option<Arc<dyn WebSearch>> = match &config.search {
            Some(s) if !s.api_key.trim().is_empty() => {
                Some(Arc::new(TavilySearch::new(&s.api_key)))
            }
            _ => {
                warn!("No search API key configured; collectors will lean on fallbacks");
                None
            }
        };
        let max_results = config.search.as_ref().map(|s| s.max_results).unwrap_or(5);
        let c = &config.collectors;

        let mut trend_feeds: Vec<Arc<dyn FeedSource>> = Vec::new();
        if let Some(news) = config.news.as_ref().filter(|n| !n.api_key.trim().is_empty()) {
            trend_feeds.push(Arc::new(NewsApiFeed::new(&news.api_key, news.page_size)));
        }
        for sub in &c.subreddits {
            trend_feeds.push(Arc::new(RedditFeed::new(sub, c.reddit_limit)));
        }

        info!(
            search = search.is_some(),
            trend_feeds = trend_feeds.len(),
            llm = llm.is_some(),
            "Collectors configured"
        );

        let competitor = CompetitorScout::new(
            search.clone(),
            Arc::new(HttpFetcher::new()),
            llm.clone(),
            CompetitorSettings {
                max_results,
                max_pages: c.max_pages,
                scrape_max_chars: c.scrape_max_chars,
                timeout_secs: config.timeout_for(competitor::NAME),
            },
        );
        let trend = TrendScraper::new(search.clone(), trend_feeds, llm.clone())
            .with_max_results(max_results)
            .with_timeout_secs(config.timeout_for(trend::NAME));
        let paper = TechPaperMiner::new(
            vec![Arc::new(ArxivFeed::new(c.arxiv_max_results))],
            search,
            llm,
        )
        .with_max_results(max_results)
        .with_timeout_secs(config.timeout_for(paper::NAME));

        Self {
            competitor,
            trend,
            paper,
        }
    }
}
