//! Single bounded HTTP fetches with typed outcomes.
//!
//! [`FetchClient::fetch`] never returns an error past its boundary: every
//! failure mode is a [`FetchFailure`] value, and the whole request including
//! the body read is bounded by the caller's timeout.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;

use crate::error::CrawlError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Timeout,
    HttpError(u16),
    NetworkError(String),
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Timeout => write!(f, "timed out"),
            FetchFailure::HttpError(status) => write!(f, "HTTP {status}"),
            FetchFailure::NetworkError(cause) => write!(f, "network error: {cause}"),
        }
    }
}

pub type FetchOutcome = Result<FetchedPage, FetchFailure>;

/// One try against one url, logged and then dropped.
#[derive(Debug)]
pub struct FetchAttempt<'a> {
    pub source: &'a str,
    pub url: &'a str,
    pub attempt: u32,
    pub outcome: &'a FetchOutcome,
    pub elapsed: Duration,
}

impl FetchAttempt<'_> {
    pub fn log(&self) {
        let elapsed_ms = u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX);
        match self.outcome {
            Ok(page) => tracing::debug!(
                source = %self.source,
                url = %self.url,
                attempt = self.attempt,
                status = page.status,
                elapsed_ms,
                "fetch succeeded"
            ),
            Err(failure) => tracing::debug!(
                source = %self.source,
                url = %self.url,
                attempt = self.attempt,
                elapsed_ms,
                outcome = %failure,
                "fetch failed"
            ),
        }
    }
}

/// Shared HTTP client. Proxied clients are built on first use and cached
/// per proxy url.
pub struct FetchClient {
    direct: Client,
    proxied: DashMap<String, Client>,
    user_agent: String,
}

impl FetchClient {
    /// # Errors
    ///
    /// Returns [`CrawlError::Client`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(user_agent: &str) -> Result<Self, CrawlError> {
        Ok(Self {
            direct: build_client(user_agent, None)?,
            proxied: DashMap::new(),
            user_agent: user_agent.to_owned(),
        })
    }

    /// Fetch `url`, giving up after `timeout`.
    ///
    /// `proxy` is chosen by the caller; `None` connects directly.
    pub async fn fetch(&self, url: &str, timeout: Duration, proxy: Option<&str>) -> FetchOutcome {
        let client = self.client_for(proxy)?;
        match tokio::time::timeout(timeout, send(&client, url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchFailure::Timeout),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchFailure> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }
        let client = build_client(&self.user_agent, Some(proxy))
            .map_err(|e| FetchFailure::NetworkError(format!("invalid proxy: {e}")))?;
        self.proxied.insert(proxy.to_owned(), client.clone());
        Ok(client)
    }
}

fn build_client(user_agent: &str, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent);
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }
    builder.build()
}

async fn send(client: &Client, url: &str) -> FetchOutcome {
    let response = client
        .get(url)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
        )
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await
        .map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchFailure::HttpError(status.as_u16()));
    }

    let body = response.text().await.map_err(classify)?;
    Ok(FetchedPage {
        status: status.as_u16(),
        body,
    })
}

fn classify(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::NetworkError(err.to_string())
    }
}
