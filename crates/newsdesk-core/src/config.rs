use crate::app_config::{AiConfig, AppConfig, Environment, SinkKind};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid or the AI endpoint is set
/// without an API key.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files, which is useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup with no `set_var`/`remove_var` needed.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    // A zero bound would stall the crawler.
    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = parse_usize(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let env = parse_environment(&or_default("NEWSDESK_ENV", "development"))?;
    let log_level = or_default("NEWSDESK_LOG_LEVEL", "info");
    let sources_path = PathBuf::from(or_default("NEWSDESK_SOURCES_PATH", "./config/sources.yaml"));

    let sink = or_default("NEWSDESK_SINK", "csv")
        .parse::<SinkKind>()
        .map_err(|reason| invalid("NEWSDESK_SINK", reason))?;
    let output_path = PathBuf::from(or_default(
        "NEWSDESK_OUTPUT_PATH",
        "./output/news_articles.csv",
    ));
    let csv_delimiter = parse_delimiter(&or_default("NEWSDESK_CSV_DELIMITER", ","))
        .map_err(|reason| invalid("NEWSDESK_CSV_DELIMITER", reason))?;

    let request_timeout_secs = parse_u64("NEWSDESK_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("NEWSDESK_USER_AGENT", "newsdesk/0.1 (news-crawler)");
    let max_concurrent_sources = parse_positive_usize("NEWSDESK_MAX_CONCURRENT_SOURCES", "5")?;
    let max_concurrent_fetches = parse_positive_usize("NEWSDESK_MAX_CONCURRENT_FETCHES", "16")?;
    let per_host_concurrency = parse_positive_usize("NEWSDESK_PER_HOST_CONCURRENCY", "2")?;
    let min_host_spacing_ms = parse_u64("NEWSDESK_MIN_HOST_SPACING_MS", "2000")?;

    let max_attempts = parse_u32("NEWSDESK_MAX_ATTEMPTS", "3")?;
    if max_attempts == 0 {
        return Err(invalid("NEWSDESK_MAX_ATTEMPTS", "must be at least 1".to_string()));
    }
    let retry_backoff_base_ms = parse_u64("NEWSDESK_RETRY_BACKOFF_BASE_MS", "1000")?;
    let retry_max_delay_ms = parse_u64("NEWSDESK_RETRY_MAX_DELAY_MS", "30000")?;

    let articles_per_source = parse_positive_usize("NEWSDESK_ARTICLES_PER_SOURCE", "10")?;
    let max_articles = parse_positive_usize("NEWSDESK_MAX_ARTICLES", "500")?;
    let run_deadline_secs = parse_u64("NEWSDESK_RUN_DEADLINE_SECS", "600")?;
    let cancel_grace_ms = parse_u64("NEWSDESK_CANCEL_GRACE_MS", "5000")?;

    let proxies = parse_proxies(&or_default("NEWSDESK_PROXIES", ""))
        .map_err(|reason| invalid("NEWSDESK_PROXIES", reason))?;
    let proxy_rotation_every = parse_positive_usize("NEWSDESK_PROXY_ROTATION_EVERY", "10")?;
    let min_title_words = parse_usize("NEWSDESK_MIN_TITLE_WORDS", "3")?;

    let ai = match lookup("NEWSDESK_AI_ENDPOINT").ok().filter(|v| !v.trim().is_empty()) {
        Some(endpoint) => {
            url::Url::parse(&endpoint)
                .map_err(|e| invalid("NEWSDESK_AI_ENDPOINT", e.to_string()))?;
            let api_key = lookup("NEWSDESK_AI_API_KEY")
                .map_err(|_| ConfigError::MissingEnvVar("NEWSDESK_AI_API_KEY".to_string()))?;
            Some(AiConfig {
                endpoint,
                api_key,
                model: or_default("NEWSDESK_AI_MODEL", "gpt-4o-mini"),
                timeout_secs: parse_u64("NEWSDESK_AI_TIMEOUT_SECS", "20")?,
            })
        }
        None => None,
    };

    let crawl_interval_minutes = parse_u64("NEWSDESK_CRAWL_INTERVAL_MINUTES", "60")?;
    let retry_delay_secs = parse_u64("NEWSDESK_RETRY_DELAY_SECS", "60")?;

    Ok(AppConfig {
        env,
        log_level,
        sources_path,
        sink,
        output_path,
        csv_delimiter,
        request_timeout_secs,
        user_agent,
        max_concurrent_sources,
        max_concurrent_fetches,
        per_host_concurrency,
        min_host_spacing_ms,
        max_attempts,
        retry_backoff_base_ms,
        retry_max_delay_ms,
        articles_per_source,
        max_articles,
        run_deadline_secs,
        cancel_grace_ms,
        proxies,
        proxy_rotation_every,
        min_title_words,
        ai,
        crawl_interval_minutes,
        retry_delay_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "NEWSDESK_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_delimiter(raw: &str) -> Result<u8, String> {
    match raw.as_bytes() {
        [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(*b),
        _ => Err(format!("expected a single ASCII character, got '{raw}'")),
    }
}

/// Splits a comma-separated proxy list, validating each entry as a URL.
fn parse_proxies(raw: &str) -> Result<Vec<String>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            url::Url::parse(p)
                .map(|_| p.to_string())
                .map_err(|e| format!("invalid proxy URL: {e}"))
        })
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
