use std::time::Duration;

use newsdesk_core::AppConfig;

use crate::retry::RetryPolicy;

/// Run-shaping knobs for one crawl, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_concurrent_sources: usize,
    pub max_concurrent_fetches: usize,
    pub per_host_concurrency: usize,
    pub min_host_spacing: Duration,
    pub retry: RetryPolicy,
    pub articles_per_source: usize,
    pub max_articles: usize,
    pub run_deadline: Duration,
    pub cancel_grace: Duration,
    pub proxies: Vec<String>,
    pub proxy_rotation_every: usize,
    pub min_title_words: usize,
}

impl CrawlSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: config.user_agent.clone(),
            max_concurrent_sources: config.max_concurrent_sources,
            max_concurrent_fetches: config.max_concurrent_fetches,
            per_host_concurrency: config.per_host_concurrency,
            min_host_spacing: Duration::from_millis(config.min_host_spacing_ms),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_backoff_base_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ),
            articles_per_source: config.articles_per_source,
            max_articles: config.max_articles,
            run_deadline: Duration::from_secs(config.run_deadline_secs),
            cancel_grace: Duration::from_millis(config.cancel_grace_ms),
            proxies: config.proxies.clone(),
            proxy_rotation_every: config.proxy_rotation_every,
            min_title_words: config.min_title_words,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: "newsdesk/0.1 (news-crawler)".to_string(),
            max_concurrent_sources: 5,
            max_concurrent_fetches: 16,
            per_host_concurrency: 2,
            min_host_spacing: Duration::from_millis(2000),
            retry: RetryPolicy::new(3, Duration::from_millis(1000), Duration::from_millis(30_000)),
            articles_per_source: 10,
            max_articles: 500,
            run_deadline: Duration::from_secs(600),
            cancel_grace: Duration::from_millis(5000),
            proxies: Vec::new(),
            proxy_rotation_every: 10,
            min_title_words: 3,
        }
    }
}
