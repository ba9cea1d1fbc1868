//! One source's crawl: discover article links, then fetch and extract each
//! one in discovery order.
//!
//! ```text
//! Discovering -> Fetching -> Extracting -> Reporting -> (next url) ... -> Done
//!                  |   ^
//!                  v   |
//!                Retrying
//! ```
//!
//! Results travel to the orchestrator as [`WorkerEvent`]s. A failed url is
//! reported and skipped; only a failed discovery ends the worker early.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use newsdesk_core::SourceConfig;

use crate::discover::{parse_listing, CompiledProfile, ListingEntry};
use crate::error::CrawlError;
use crate::extract::{Candidate, Extractor};
use crate::fetch::{FetchAttempt, FetchClient, FetchOutcome, FetchedPage};
use crate::proxy::ProxyRotator;
use crate::rate_limit::HostRateLimiter;
use crate::retry::{GiveUpReason, RetryDecision, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Discovering,
    Fetching,
    Retrying,
    Extracting,
    Reporting,
    Done,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Discovered {
        source: String,
        count: usize,
    },
    DiscoveryFailed {
        source: String,
        error: CrawlError,
    },
    Candidate {
        source: String,
        candidate: Candidate,
    },
    ItemFailed {
        source: String,
        error: CrawlError,
    },
    Finished {
        source: String,
        fetch_attempts: u32,
    },
}

/// Where a fetch attempt leads.
#[derive(Debug)]
pub enum FetchTransition {
    Extract(FetchedPage),
    Retry { after: Duration },
    Abandon(CrawlError),
}

impl FetchTransition {
    #[must_use]
    pub fn next_state(&self) -> WorkerState {
        match self {
            FetchTransition::Extract(_) => WorkerState::Extracting,
            FetchTransition::Retry { .. } => WorkerState::Retrying,
            FetchTransition::Abandon(_) => WorkerState::Reporting,
        }
    }
}

/// Pure transition out of `Fetching` for attempt number `attempt` (1-based).
#[must_use]
pub fn fetch_transition(
    policy: &RetryPolicy,
    url: &str,
    attempt: u32,
    outcome: FetchOutcome,
) -> FetchTransition {
    let failure = match outcome {
        Ok(page) => return FetchTransition::Extract(page),
        Err(failure) => failure,
    };
    match policy.decide(&failure, attempt) {
        RetryDecision::Retry { after } => FetchTransition::Retry { after },
        RetryDecision::GiveUp(GiveUpReason::PermanentStatus(status)) => {
            FetchTransition::Abandon(CrawlError::PermanentHttp {
                url: url.to_owned(),
                status,
            })
        }
        RetryDecision::GiveUp(GiveUpReason::MaxAttemptsExceeded) => {
            FetchTransition::Abandon(CrawlError::TransientNetwork {
                url: url.to_owned(),
                attempts: attempt,
                cause: failure.to_string(),
            })
        }
    }
}

/// Resources shared by every worker in a run.
pub struct WorkerContext {
    pub fetcher: FetchClient,
    pub limiter: HostRateLimiter,
    pub fetch_slots: Arc<Semaphore>,
    pub proxies: ProxyRotator,
    pub policy: RetryPolicy,
    pub extractor: Extractor,
    pub request_timeout: Duration,
    pub articles_per_source: usize,
    pub cancel: CancellationToken,
}

enum Fetched {
    Page(FetchedPage),
    Failed(CrawlError),
    Cancelled,
}

pub struct SourceWorker {
    source: Arc<SourceConfig>,
    profile: Arc<CompiledProfile>,
    ctx: Arc<WorkerContext>,
    events: mpsc::Sender<WorkerEvent>,
    state: WorkerState,
    fetch_attempts: u32,
}

impl SourceWorker {
    #[must_use]
    pub fn new(
        source: Arc<SourceConfig>,
        profile: Arc<CompiledProfile>,
        ctx: Arc<WorkerContext>,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            source,
            profile,
            ctx,
            events,
            state: WorkerState::Discovering,
            fetch_attempts: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn enter(&mut self, next: WorkerState) {
        if self.state != next {
            tracing::trace!(source = %self.source.name, from = ?self.state, to = ?next, "worker state");
            self.state = next;
        }
    }

    pub async fn run(mut self) {
        let name = self.source.name.clone();
        tracing::info!(source = %name, "source crawl started");

        self.enter(WorkerState::Discovering);
        match self.discover().await {
            Ok(entries) => {
                tracing::info!(source = %name, discovered = entries.len(), "discovery complete");
                let discovered = WorkerEvent::Discovered {
                    source: name.clone(),
                    count: entries.len(),
                };
                if self.emit(discovered).await {
                    self.process(entries).await;
                }
            }
            Err(Some(error)) => {
                tracing::warn!(source = %name, error = %error, "source discovery failed");
                let _ = self
                    .emit(WorkerEvent::DiscoveryFailed {
                        source: name.clone(),
                        error,
                    })
                    .await;
            }
            Err(None) => {}
        }

        self.enter(WorkerState::Done);
        let _ = self
            .emit(WorkerEvent::Finished {
                source: name.clone(),
                fetch_attempts: self.fetch_attempts,
            })
            .await;
        tracing::info!(source = %name, attempts = self.fetch_attempts, "source crawl finished");
    }

    /// Collect article links up to the per-source cap.
    ///
    /// `Err(None)` means the run was cancelled mid-discovery.
    async fn discover(&mut self) -> Result<Vec<ListingEntry>, Option<CrawlError>> {
        let source = Arc::clone(&self.source);
        let cap = self.ctx.articles_per_source;
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut reachable = false;
        let mut last_error = None;

        'bases: for base in &source.base_urls {
            for (page_no, page_url) in source.listing_pages(base).into_iter().enumerate() {
                if entries.len() >= cap {
                    break 'bases;
                }
                let parsed_url = match Url::parse(&page_url) {
                    Ok(u) => u,
                    Err(e) => {
                        last_error = Some(format!("invalid listing url {page_url}: {e}"));
                        break;
                    }
                };
                let page = match self.fetch_with_retry(&page_url).await {
                    Fetched::Page(page) => page,
                    Fetched::Cancelled => return Err(None),
                    Fetched::Failed(error) => {
                        if page_no == 0 {
                            last_error = Some(error.to_string());
                        } else {
                            tracing::warn!(
                                source = %source.name,
                                url = %page_url,
                                error = %error,
                                "listing page failed; skipping remaining pages"
                            );
                        }
                        break;
                    }
                };
                reachable = true;
                for entry in parse_listing(&page.body, &parsed_url, &self.profile) {
                    if entries.len() >= cap {
                        break;
                    }
                    if seen.insert(entry.url.clone()) {
                        entries.push(entry);
                    }
                }
            }
        }

        if reachable {
            Ok(entries)
        } else {
            Err(Some(CrawlError::SourceDiscovery {
                source_name: source.name.clone(),
                reason: last_error.unwrap_or_else(|| "no listing pages reachable".to_string()),
            }))
        }
    }

    async fn process(&mut self, entries: Vec<ListingEntry>) {
        let source = Arc::clone(&self.source);
        for entry in entries {
            if self.ctx.cancel.is_cancelled() {
                break;
            }

            self.enter(WorkerState::Fetching);
            let page = match self.fetch_with_retry(&entry.url).await {
                Fetched::Page(page) => page,
                Fetched::Cancelled => break,
                Fetched::Failed(error) => {
                    tracing::warn!(source = %source.name, url = %entry.url, error = %error, "article fetch failed");
                    self.enter(WorkerState::Reporting);
                    if !self.report_failure(error).await {
                        break;
                    }
                    continue;
                }
            };

            self.enter(WorkerState::Extracting);
            let Ok(page_url) = Url::parse(&entry.url) else {
                continue;
            };
            let extracted = tokio::select! {
                biased;
                () = self.ctx.cancel.cancelled() => break,
                result = self.ctx.extractor.extract(
                    &page.body,
                    &page_url,
                    &source,
                    &self.profile,
                    &entry,
                    Utc::now(),
                ) => result,
            };

            self.enter(WorkerState::Reporting);
            let delivered = match extracted {
                Ok(candidate) => {
                    self.emit(WorkerEvent::Candidate {
                        source: source.name.clone(),
                        candidate,
                    })
                    .await
                }
                Err(failure) => {
                    tracing::warn!(source = %source.name, url = %entry.url, error = %failure, "extraction failed");
                    self.report_failure(CrawlError::Extraction {
                        url: entry.url.clone(),
                        source: failure,
                    })
                    .await
                }
            };
            if !delivered {
                break;
            }
        }
    }

    /// Drive one url through `Fetching`/`Retrying` until it succeeds, is
    /// abandoned, or the run is cancelled.
    async fn fetch_with_retry(&mut self, url: &str) -> Fetched {
        let host = match Url::parse(url) {
            Ok(parsed) => parsed.host_str().unwrap_or_default().to_owned(),
            Err(e) => {
                return Fetched::Failed(CrawlError::TransientNetwork {
                    url: url.to_owned(),
                    attempts: 0,
                    cause: format!("invalid url: {e}"),
                })
            }
        };
        let cancel = self.ctx.cancel.clone();
        let mut attempt = 1u32;
        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Fetched::Cancelled,
                outcome = self.fetch_once(url, &host, attempt) => outcome,
            };
            let Some(outcome) = outcome else {
                return Fetched::Cancelled;
            };

            let transition = fetch_transition(&self.ctx.policy, url, attempt, outcome);
            self.enter(transition.next_state());
            match transition {
                FetchTransition::Extract(page) => return Fetched::Page(page),
                FetchTransition::Abandon(error) => return Fetched::Failed(error),
                FetchTransition::Retry { after } => {
                    tracing::warn!(
                        source = %self.source.name,
                        url,
                        attempt,
                        max_attempts = self.ctx.policy.max_attempts,
                        delay_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
                        "transient fetch failure; retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Fetched::Cancelled,
                        () = tokio::time::sleep(after) => {}
                    }
                    attempt += 1;
                    self.enter(WorkerState::Fetching);
                }
            }
        }
    }

    /// One rate-limited try. `None` when the shared limits were shut down.
    async fn fetch_once(&mut self, url: &str, host: &str, attempt: u32) -> Option<FetchOutcome> {
        let permit = self.ctx.limiter.acquire(host).await.ok()?;
        let slot = Arc::clone(&self.ctx.fetch_slots).acquire_owned().await.ok()?;
        let proxy = self.ctx.proxies.pick();

        self.fetch_attempts += 1;
        let started = Instant::now();
        let outcome = self
            .ctx
            .fetcher
            .fetch(url, self.ctx.request_timeout, proxy)
            .await;
        FetchAttempt {
            source: &self.source.name,
            url,
            attempt,
            outcome: &outcome,
            elapsed: started.elapsed(),
        }
        .log();

        drop(slot);
        self.ctx.limiter.release(permit);
        Some(outcome)
    }

    async fn report_failure(&self, error: CrawlError) -> bool {
        self.emit(WorkerEvent::ItemFailed {
            source: self.source.name.clone(),
            error,
        })
        .await
    }

    /// Send an event; `false` once the orchestrator stopped listening.
    async fn emit(&self, event: WorkerEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod tests;
