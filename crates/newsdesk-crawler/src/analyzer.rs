//! External content-analysis capability.
//!
//! The extractor asks a [`ContentAnalyzer`] for a title, category and summary
//! only when structural extraction comes up short. The capability is never
//! assumed to be available: every failure is an [`AnalyzerError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use newsdesk_core::AiConfig;

use crate::error::CrawlError;
use crate::text::{non_empty, truncate_chars};

/// Characters of page text sent to the analyzer.
const MAX_INPUT_CHARS: usize = 12_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub title: Option<String>,
    pub category: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    #[error("content analysis unavailable: {0}")]
    Unavailable(String),

    #[error("malformed content analysis response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalyzerError>;
}

/// Analyzer used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalyzer;

#[async_trait]
impl ContentAnalyzer for DisabledAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<Analysis, AnalyzerError> {
        Err(AnalyzerError::Unavailable(
            "no analysis endpoint configured".to_string(),
        ))
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiAnalyzer {
    /// # Errors
    ///
    /// Returns [`CrawlError::Client`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            timeout,
        })
    }

    /// # Errors
    ///
    /// Returns [`CrawlError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &AiConfig) -> Result<Self, CrawlError> {
        Self::new(
            &config.endpoint,
            &config.api_key,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn request(&self, text: &str) -> Result<Analysis, AnalyzerError> {
        let req_body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": "You analyze news articles. Return JSON with keys: title, category, summary. Use a short lowercase category such as technology, business, politics, science, health, sports or entertainment."
                },
                {
                    "role": "user",
                    "content": format!(
                        "Extract the headline, a category and a one or two sentence factual summary from this article text. Use empty strings for anything you cannot determine.\n\nTEXT:\n{}",
                        truncate_chars(text, MAX_INPUT_CHARS)
                    )
                }
            ],
            "temperature": 0.1
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req_body)
            .send()
            .await
            .map_err(|e| AnalyzerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzerError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
        let content = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| AnalyzerError::Malformed("missing choices[0].message.content".into()))?;

        parse_analysis(content)
    }
}

#[async_trait]
impl ContentAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis, AnalyzerError> {
        match tokio::time::timeout(self.timeout, self.request(text)).await {
            Ok(result) => result,
            Err(_) => Err(AnalyzerError::Unavailable(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Parse the model's JSON reply; blank fields become `None`.
fn parse_analysis(content: &str) -> Result<Analysis, AnalyzerError> {
    let raw: RawAnalysis =
        serde_json::from_str(content).map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
    Ok(Analysis {
        title: raw.title.as_deref().and_then(non_empty),
        category: raw
            .category
            .as_deref()
            .and_then(non_empty)
            .map(|c| c.to_lowercase()),
        summary: raw.summary.as_deref().and_then(non_empty),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    fn analyzer(server: &MockServer, timeout: Duration) -> OpenAiAnalyzer {
        OpenAiAnalyzer::new(
            &format!("{}/v1/chat/completions", server.uri()),
            "sk-test",
            "gpt-4o-mini",
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn parse_analysis_blanks_become_none() {
        let analysis =
            parse_analysis(r#"{"title":"  Rates  hold ","category":"Business","summary":""}"#)
                .unwrap();
        assert_eq!(analysis.title.as_deref(), Some("Rates hold"));
        assert_eq!(analysis.category.as_deref(), Some("business"));
        assert_eq!(analysis.summary, None);
    }

    #[test]
    fn parse_analysis_rejects_non_json() {
        assert!(matches!(
            parse_analysis("Sure! Here is the summary"),
            Err(AnalyzerError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn disabled_analyzer_is_unavailable() {
        let result = DisabledAnalyzer.analyze("anything").await;
        assert!(matches!(result, Err(AnalyzerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn openai_analyzer_parses_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"title":"Chipmaker unveils new processor line","category":"technology","summary":"A new chip."}"#,
            )))
            .mount(&server)
            .await;

        let analysis = analyzer(&server, Duration::from_secs(5))
            .analyze("article text")
            .await
            .unwrap();
        assert_eq!(
            analysis.title.as_deref(),
            Some("Chipmaker unveils new processor line")
        );
        assert_eq!(analysis.category.as_deref(), Some("technology"));
    }

    #[tokio::test]
    async fn openai_analyzer_maps_server_error_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = analyzer(&server, Duration::from_secs(5)).analyze("x").await;
        assert_eq!(result, Err(AnalyzerError::Unavailable("HTTP 500".into())));
    }

    #[tokio::test]
    async fn openai_analyzer_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("{}"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = analyzer(&server, Duration::from_millis(100))
            .analyze("x")
            .await;
        assert!(matches!(result, Err(AnalyzerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn openai_analyzer_flags_missing_content_as_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let result = analyzer(&server, Duration::from_secs(5)).analyze("x").await;
        assert!(matches!(result, Err(AnalyzerError::Malformed(_))));
    }
}
