use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

#[test]
fn parse_environment_development() {
    assert_eq!(
        parse_environment("development").unwrap(),
        Environment::Development
    );
}

#[test]
fn parse_environment_test() {
    assert_eq!(parse_environment("test").unwrap(), Environment::Test);
}

#[test]
fn parse_environment_production() {
    assert_eq!(
        parse_environment("production").unwrap(),
        Environment::Production
    );
}

#[test]
fn parse_environment_unknown_fails() {
    let err = parse_environment("unknown").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "NEWSDESK_ENV"));
}

#[test]
fn build_app_config_defaults_with_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let result = build_app_config(lookup_from_map(&map));
    assert!(result.is_ok(), "expected Ok, got: {result:?}");
    let cfg = result.unwrap();
    assert_eq!(cfg.env, Environment::Development);
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.sources_path.to_str(), Some("./config/sources.yaml"));
    assert_eq!(cfg.sink, SinkKind::Csv);
    assert_eq!(cfg.output_path.to_str(), Some("./output/news_articles.csv"));
    assert_eq!(cfg.csv_delimiter, b',');
    assert_eq!(cfg.request_timeout_secs, 30);
    assert_eq!(cfg.user_agent, "newsdesk/0.1 (news-crawler)");
    assert_eq!(cfg.max_concurrent_sources, 5);
    assert_eq!(cfg.max_concurrent_fetches, 16);
    assert_eq!(cfg.per_host_concurrency, 2);
    assert_eq!(cfg.min_host_spacing_ms, 2000);
    assert_eq!(cfg.max_attempts, 3);
    assert_eq!(cfg.retry_backoff_base_ms, 1000);
    assert_eq!(cfg.retry_max_delay_ms, 30_000);
    assert_eq!(cfg.articles_per_source, 10);
    assert_eq!(cfg.max_articles, 500);
    assert_eq!(cfg.run_deadline_secs, 600);
    assert_eq!(cfg.cancel_grace_ms, 5000);
    assert!(cfg.proxies.is_empty());
    assert_eq!(cfg.proxy_rotation_every, 10);
    assert_eq!(cfg.min_title_words, 3);
    assert!(cfg.ai.is_none());
    assert_eq!(cfg.crawl_interval_minutes, 60);
    assert_eq!(cfg.retry_delay_secs, 60);
}

#[test]
fn request_timeout_override() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_REQUEST_TIMEOUT_SECS", "60");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.request_timeout_secs, 60);
}

#[test]
fn request_timeout_invalid() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_REQUEST_TIMEOUT_SECS", "not-a-number");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSDESK_REQUEST_TIMEOUT_SECS"),
        "expected InvalidEnvVar(NEWSDESK_REQUEST_TIMEOUT_SECS), got: {result:?}"
    );
}

#[test]
fn max_attempts_zero_is_rejected() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_MAX_ATTEMPTS", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSDESK_MAX_ATTEMPTS"),
        "expected InvalidEnvVar(NEWSDESK_MAX_ATTEMPTS), got: {result:?}"
    );
}

#[test]
fn per_host_concurrency_zero_is_rejected() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_PER_HOST_CONCURRENCY", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSDESK_PER_HOST_CONCURRENCY"),
        "expected InvalidEnvVar(NEWSDESK_PER_HOST_CONCURRENCY), got: {result:?}"
    );
}

#[test]
fn max_articles_override() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_MAX_ARTICLES", "25");
    map.insert("NEWSDESK_ARTICLES_PER_SOURCE", "4");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.max_articles, 25);
    assert_eq!(cfg.articles_per_source, 4);
}

#[test]
fn sink_kv_is_parsed() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_SINK", "kv");
    map.insert("NEWSDESK_OUTPUT_PATH", "/tmp/articles.json");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.sink, SinkKind::KeyValue);
    assert_eq!(cfg.output_path.to_str(), Some("/tmp/articles.json"));
}

#[test]
fn unknown_sink_fails() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_SINK", "dynamodb");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSDESK_SINK"),
        "expected InvalidEnvVar(NEWSDESK_SINK), got: {result:?}"
    );
}

#[test]
fn pipe_delimiter_is_accepted() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_CSV_DELIMITER", "|");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.csv_delimiter, b'|');
}

#[test]
fn multi_char_delimiter_fails() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_CSV_DELIMITER", "||");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSDESK_CSV_DELIMITER"),
        "expected InvalidEnvVar(NEWSDESK_CSV_DELIMITER), got: {result:?}"
    );
}

#[test]
fn proxies_are_split_and_trimmed() {
    let mut map = HashMap::new();
    map.insert(
        "NEWSDESK_PROXIES",
        "http://proxy-a.local:8080, http://proxy-b.local:8080 ,",
    );
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(
        cfg.proxies,
        vec![
            "http://proxy-a.local:8080".to_string(),
            "http://proxy-b.local:8080".to_string()
        ]
    );
}

#[test]
fn invalid_proxy_fails() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_PROXIES", "not a url");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSDESK_PROXIES"),
        "expected InvalidEnvVar(NEWSDESK_PROXIES), got: {result:?}"
    );
}

#[test]
fn ai_endpoint_without_key_fails() {
    let mut map = HashMap::new();
    map.insert(
        "NEWSDESK_AI_ENDPOINT",
        "https://api.openai.com/v1/chat/completions",
    );
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "NEWSDESK_AI_API_KEY"),
        "expected MissingEnvVar(NEWSDESK_AI_API_KEY), got: {result:?}"
    );
}

#[test]
fn ai_endpoint_with_key_builds_ai_config() {
    let mut map = HashMap::new();
    map.insert(
        "NEWSDESK_AI_ENDPOINT",
        "https://api.openai.com/v1/chat/completions",
    );
    map.insert("NEWSDESK_AI_API_KEY", "sk-test");
    map.insert("NEWSDESK_AI_TIMEOUT_SECS", "5");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let ai = cfg.ai.expect("ai config should be present");
    assert_eq!(ai.api_key, "sk-test");
    assert_eq!(ai.model, "gpt-4o-mini");
    assert_eq!(ai.timeout_secs, 5);
}

#[test]
fn blank_ai_endpoint_is_treated_as_unset() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_AI_ENDPOINT", "   ");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.ai.is_none());
}

#[test]
fn debug_output_redacts_ai_key() {
    let mut map = HashMap::new();
    map.insert("NEWSDESK_AI_ENDPOINT", "https://llm.local/v1/chat/completions");
    map.insert("NEWSDESK_AI_API_KEY", "sk-should-not-leak");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("sk-should-not-leak"));
}
