//! Runs every source's worker concurrently and streams accepted records to a
//! sink.
//!
//! The orchestrator task is the only place run state is mutated: workers
//! send [`WorkerEvent`]s over a bounded channel and the orchestrator
//! deduplicates, writes and counts them as they arrive. A run stops early
//! when the deadline passes, the article cap is reached, or the caller's
//! shutdown token fires; workers are then cancelled and, after the grace
//! period, aborted.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use newsdesk_core::{ArticleRecord, SourceConfig};

use crate::analyzer::ContentAnalyzer;
use crate::discover::CompiledProfile;
use crate::error::CrawlError;
use crate::extract::Extractor;
use crate::fetch::FetchClient;
use crate::proxy::ProxyRotator;
use crate::rate_limit::HostRateLimiter;
use crate::settings::CrawlSettings;
use crate::sink::Sink;
use crate::summary::{Offer, RunState, RunSummary};
use crate::worker::{SourceWorker, WorkerContext, WorkerEvent};

const EVENT_BUFFER: usize = 64;

pub struct Orchestrator {
    settings: CrawlSettings,
    sources: Vec<(Arc<SourceConfig>, Arc<CompiledProfile>)>,
    analyzer: Arc<dyn ContentAnalyzer>,
}

impl Orchestrator {
    /// Compile every source's selectors up front so a typo fails the run
    /// before any request is made.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidSelector`] for the first selector that
    /// does not parse.
    pub fn new(
        settings: CrawlSettings,
        sources: Vec<SourceConfig>,
        analyzer: Arc<dyn ContentAnalyzer>,
    ) -> Result<Self, CrawlError> {
        let sources = sources
            .into_iter()
            .map(|source| {
                let profile = CompiledProfile::compile(&source.name, &source.profile())?;
                Ok((Arc::new(source), Arc::new(profile)))
            })
            .collect::<Result<Vec<_>, CrawlError>>()?;
        Ok(Self {
            settings,
            sources,
            analyzer,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Crawl every source once.
    ///
    /// Cancelling `shutdown` stops the run cooperatively; the summary of
    /// what was written so far is still returned.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::SinkWrite`] when a record could not be written
    /// after all retries, [`CrawlError::SinkFlush`] when the final flush
    /// fails, and [`CrawlError::Client`] when the HTTP client cannot be
    /// built. Per-article and per-source failures never end the run; they
    /// are counted in the summary.
    pub async fn run(
        &self,
        sink: &mut dyn Sink,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, CrawlError> {
        let settings = &self.settings;
        let run_id = Uuid::new_v4();
        let cancel = shutdown.child_token();
        let ctx = Arc::new(WorkerContext {
            fetcher: FetchClient::new(&settings.user_agent)?,
            limiter: HostRateLimiter::new(settings.per_host_concurrency, settings.min_host_spacing),
            fetch_slots: Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1))),
            proxies: ProxyRotator::new(settings.proxies.clone(), settings.proxy_rotation_every),
            policy: settings.retry,
            extractor: Extractor::new(Arc::clone(&self.analyzer), settings.min_title_words),
            request_timeout: settings.request_timeout,
            articles_per_source: settings.articles_per_source,
            cancel: cancel.clone(),
        });
        let mut state = RunState::new(
            run_id,
            Utc::now(),
            settings.max_articles,
            self.sources.iter().map(|(s, _)| s.name.as_str()),
        );

        tracing::info!(
            %run_id,
            sources = self.sources.len(),
            max_articles = settings.max_articles,
            deadline_secs = settings.run_deadline.as_secs(),
            "crawl run started"
        );

        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let source_slots = Arc::new(Semaphore::new(settings.max_concurrent_sources.max(1)));
        let mut workers = JoinSet::new();
        for (source, profile) in &self.sources {
            let worker = SourceWorker::new(
                Arc::clone(source),
                Arc::clone(profile),
                Arc::clone(&ctx),
                tx.clone(),
            );
            let slots = Arc::clone(&source_slots);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _slot = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    slot = slots.acquire_owned() => match slot {
                        Ok(slot) => slot,
                        Err(_) => return,
                    },
                };
                worker.run().await;
            });
        }
        drop(tx);

        let deadline = Instant::now() + settings.run_deadline;
        let mut grace_until: Option<Instant> = None;
        let mut abandoned = false;
        let mut fatal = None;

        loop {
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline), if !state.deadline_hit() => {
                    tracing::warn!(%run_id, "run deadline reached; cancelling workers");
                    state.mark_deadline_hit();
                    cancel.cancel();
                }
                () = cancel.cancelled(), if grace_until.is_none() => {
                    grace_until = Some(Instant::now() + settings.cancel_grace);
                }
                () = tokio::time::sleep_until(grace_until.unwrap_or(deadline)), if grace_until.is_some() => {
                    tracing::warn!(
                        %run_id,
                        grace_ms = u64::try_from(settings.cancel_grace.as_millis()).unwrap_or(u64::MAX),
                        "workers still busy after grace period; aborting"
                    );
                    abandoned = true;
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self
                        .handle_event(event, &mut state, sink, &cancel, deadline)
                        .await
                    {
                        fatal = Some(e);
                        abandoned = true;
                        break;
                    }
                }
            }
        }

        if abandoned {
            cancel.cancel();
            workers.abort_all();
        }
        rx.close();
        while let Ok(event) = rx.try_recv() {
            drain_event(event, &mut state);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!(%run_id, error = %e, "source worker panicked");
                }
            }
        }

        let flushed = sink.flush().await;
        if let Some(error) = fatal {
            if let Err(e) = flushed {
                tracing::warn!(%run_id, error = %e, "sink flush failed after fatal write error");
            }
            return Err(error);
        }
        flushed.map_err(CrawlError::SinkFlush)?;

        let summary = state.into_summary(Utc::now());
        tracing::info!(
            %run_id,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            failed = summary.failed_total(),
            deadline_hit = summary.deadline_hit,
            cap_reached = summary.cap_reached,
            "crawl run finished"
        );
        Ok(summary)
    }

    async fn handle_event(
        &self,
        event: WorkerEvent,
        state: &mut RunState,
        sink: &mut dyn Sink,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), CrawlError> {
        match event {
            WorkerEvent::Discovered { source, count } => state.record_discovered(&source, count),
            WorkerEvent::DiscoveryFailed { source, error } => {
                state.record_discovery_failure(&source, error.to_string());
            }
            WorkerEvent::ItemFailed { source, error } => state.record_failure(&source, error.kind()),
            WorkerEvent::Finished {
                source,
                fetch_attempts,
            } => state.record_attempts(&source, fetch_attempts),
            WorkerEvent::Candidate { source, candidate } => {
                match state.offer(candidate, Utc::now()) {
                    Offer::Write(record) => {
                        match self.write_with_retry(sink, &record, deadline, cancel).await {
                            Ok(Written::Stored) => {}
                            Ok(Written::Interrupted) => {
                                state.record_sink_failure();
                                tracing::warn!(url = %record.url, "run stopping; sink write abandoned mid-retry");
                                return Ok(());
                            }
                            Err(e) => {
                                state.record_sink_failure();
                                tracing::error!(url = %record.url, error = %e, "sink write failed; stopping run");
                                cancel.cancel();
                                return Err(e);
                            }
                        }
                        tracing::debug!(source = %source, url = %record.url, "article accepted");
                        if state.commit(&record) {
                            tracing::info!(
                                max_articles = self.settings.max_articles,
                                "article cap reached; cancelling workers"
                            );
                            cancel.cancel();
                        }
                    }
                    Offer::Duplicate { url, existing } => {
                        tracing::debug!(source = %source, url = %url, existing = %existing, "duplicate skipped");
                    }
                    Offer::Discarded => {
                        tracing::debug!(source = %source, "candidate discarded after stop");
                    }
                }
            }
        }
        Ok(())
    }

    /// Sink failures are all treated as transient and retried on the fetch
    /// backoff schedule.
    ///
    /// A backoff never outlives the run: when `deadline` passes or `cancel`
    /// fires while waiting, the write is given up as [`Written::Interrupted`].
    async fn write_with_retry(
        &self,
        sink: &mut dyn Sink,
        record: &ArticleRecord,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Written, CrawlError> {
        let policy = &self.settings.retry;
        let mut attempt = 1u32;
        loop {
            match sink.write(record).await {
                Ok(()) => return Ok(Written::Stored),
                Err(e) if attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        url = %record.url,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "sink write failed; retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(Written::Interrupted),
                        () = tokio::time::sleep_until(deadline) => return Ok(Written::Interrupted),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Err(CrawlError::SinkWrite {
                        url: record.url.clone(),
                        source: e,
                    })
                }
            }
        }
    }
}

#[derive(Debug)]
enum Written {
    Stored,
    Interrupted,
}

/// Bookkeeping for events still queued when the run stopped listening.
/// Candidates among them are never written.
fn drain_event(event: WorkerEvent, state: &mut RunState) {
    match event {
        WorkerEvent::Discovered { source, count } => state.record_discovered(&source, count),
        WorkerEvent::DiscoveryFailed { source, error } => {
            state.record_discovery_failure(&source, error.to_string());
        }
        WorkerEvent::ItemFailed { source, error } => state.record_failure(&source, error.kind()),
        WorkerEvent::Finished {
            source,
            fetch_attempts,
        } => state.record_attempts(&source, fetch_attempts),
        WorkerEvent::Candidate { .. } => state.record_discarded(),
    }
}
