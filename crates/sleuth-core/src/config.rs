use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SleuthError};

/// Top-level sleuth configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Primary model. Without one, collectors and the synthesizer run in
    /// fallback mode.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default)]
    pub news: Option<NewsConfig>,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Runtime logging configuration.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler iteration budget.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Default per-invocation timeout for every capability.
    #[serde(default = "default_capability_timeout")]
    pub capability_timeout_secs: u64,
    /// Characters of each evidence record shown to the synthesizer.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            capability_timeout_secs: default_capability_timeout(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_max_steps() -> usize { 15 }
fn default_capability_timeout() -> u64 { 120 }
fn default_snippet_chars() -> usize { 200 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "gemini".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.2 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_search_results")]
    pub max_results: usize,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_results() -> usize { 5 }

/// NewsAPI configuration for the trend collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    pub api_key: String,
    #[serde(default = "default_news_page_size")]
    pub page_size: usize,
}

fn default_news_page_size() -> usize { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Result pages the competitor collector scrapes.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Scraped page text is truncated to this many characters.
    #[serde(default = "default_scrape_max_chars")]
    pub scrape_max_chars: usize,
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
    #[serde(default = "default_reddit_limit")]
    pub reddit_limit: usize,
    #[serde(default = "default_arxiv_max_results")]
    pub arxiv_max_results: usize,
    /// Per-capability timeout overrides, keyed by capability name.
    #[serde(default)]
    pub timeout_secs: HashMap<String, u64>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            scrape_max_chars: default_scrape_max_chars(),
            subreddits: default_subreddits(),
            reddit_limit: default_reddit_limit(),
            arxiv_max_results: default_arxiv_max_results(),
            timeout_secs: HashMap::new(),
        }
    }
}

fn default_max_pages() -> usize { 3 }
fn default_scrape_max_chars() -> usize { 8000 }
fn default_subreddits() -> Vec<String> {
    vec!["technology".to_string(), "programming".to_string()]
}
fn default_reddit_limit() -> usize { 5 }
fn default_arxiv_max_results() -> usize { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String { "data".to_string() }

/// JSONL runtime logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable runtime logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <output.dir>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
        }
    }
}

fn default_log_enabled() -> bool { true }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SleuthError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SleuthError::Config(e.to_string()))
    }

    /// Build a config from well-known environment variables.
    pub fn from_env() -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let model = if let Some(key) = env("GEMINI_API_KEY") {
            Some(ModelConfig {
                provider: "gemini".to_string(),
                model_id: "gemini-2.0-flash".to_string(),
                api_key: Some(key),
                base_url: None,
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                retry: None,
            })
        } else {
            env("OPENAI_API_KEY").map(|key| ModelConfig {
                provider: "openai".to_string(),
                model_id: "gpt-4o-mini".to_string(),
                api_key: Some(key),
                base_url: None,
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                retry: None,
            })
        };

        Self {
            model,
            search: env("TAVILY_API_KEY").map(|api_key| SearchConfig {
                provider: default_search_provider(),
                api_key,
                max_results: default_search_results(),
            }),
            news: env("NEWS_API_KEY").map(|api_key| NewsConfig {
                api_key,
                page_size: default_news_page_size(),
            }),
            ..Self::default()
        }
    }

    /// Timeout for one capability, honoring per-capability overrides.
    pub fn timeout_for(&self, capability: &str) -> u64 {
        self.collectors
            .timeout_secs
            .get(capability)
            .copied()
            .unwrap_or(self.engine.capability_timeout_secs)
    }

    /// Resolve the artifact directory (expand ~).
    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output.dir)
    }

    /// Resolve the JSONL log directory, if logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref().filter(|l| l.enabled)?;
        Some(match &log.log_dir {
            Some(dir) => expand_home(dir),
            None => self.output_dir().join("logs"),
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SLEUTH_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SLEUTH_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SLEUTH_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SLEUTH_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SLEUTH_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_steps, 15);
        assert_eq!(config.engine.capability_timeout_secs, 120);
        assert_eq!(config.engine.snippet_chars, 200);
        assert!(config.model.is_none());
        assert_eq!(config.collectors.max_pages, 3);
        assert_eq!(config.collectors.scrape_max_chars, 8000);
        assert_eq!(config.collectors.arxiv_max_results, 3);
        assert_eq!(config.output.dir, "data");
        assert!(config.log_dir().is_none());
    }

    #[test]
    fn test_model_defaults() {
        let toml_str = r#"
[model]
model_id = "gemini-2.0-flash"
api_key = "k"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let model = config.model.unwrap();
        assert_eq!(model.provider, "gemini");
        assert_eq!(model.max_tokens, 4096);
        assert!(model.retry.is_none());
    }

    #[test]
    fn test_timeout_overrides() {
        let toml_str = r#"
[engine]
capability_timeout_secs = 30

[collectors.timeout_secs]
TrendScraper = 90
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timeout_for("TrendScraper"), 90);
        assert_eq!(config.timeout_for("CompetitorScout"), 30);
    }

    #[test]
    fn test_log_dir_defaults_under_output() {
        let toml_str = r#"
[output]
dir = "/tmp/sleuth-out"

[log]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_dir(), Some(PathBuf::from("/tmp/sleuth-out/logs")));
    }
}
