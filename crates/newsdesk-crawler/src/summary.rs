//! Per-run bookkeeping and the summary reported at the end of a run.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use newsdesk_core::ArticleRecord;

use crate::dedup::{Admission, Deduplicator};
use crate::error::FailureKind;
use crate::extract::Candidate;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub discovered: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub fetch_attempts: u32,
    pub discovery_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accepted: usize,
    pub duplicates: usize,
    pub failed_by_kind: BTreeMap<FailureKind, usize>,
    pub sources: Vec<SourceReport>,
    pub categories: BTreeMap<String, usize>,
    pub deadline_hit: bool,
    pub cap_reached: bool,
    /// Candidates that arrived after the deadline or cap and were dropped.
    pub discarded_after_stop: usize,
}

impl RunSummary {
    #[must_use]
    pub fn failed(&self, kind: FailureKind) -> usize {
        self.failed_by_kind.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn failed_total(&self) -> usize {
        self.failed_by_kind.values().sum()
    }

    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let elapsed = (self.finished_at - self.started_at).num_milliseconds();
        writeln!(f, "run {} finished in {elapsed}ms", self.run_id)?;
        writeln!(
            f,
            "accepted: {}  duplicates: {}  failed: {}",
            self.accepted,
            self.duplicates,
            self.failed_total()
        )?;
        for (kind, count) in &self.failed_by_kind {
            writeln!(f, "  {kind}: {count}")?;
        }
        if self.deadline_hit {
            writeln!(f, "stopped early: run deadline reached")?;
        }
        if self.cap_reached {
            writeln!(f, "stopped early: article cap reached")?;
        }
        if self.discarded_after_stop > 0 {
            writeln!(f, "discarded after stop: {}", self.discarded_after_stop)?;
        }
        if !self.categories.is_empty() {
            writeln!(f, "by category:")?;
            for (category, count) in &self.categories {
                writeln!(f, "  {category}: {count}")?;
            }
        }
        writeln!(f, "by source:")?;
        for source in &self.sources {
            write!(
                f,
                "  {}: discovered {}, accepted {}, duplicates {}, failed {}",
                source.name, source.discovered, source.accepted, source.duplicates, source.failed
            )?;
            if let Some(err) = &source.discovery_error {
                write!(f, " (discovery failed: {err})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// What the orchestrator should do with an offered candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Offer {
    Write(ArticleRecord),
    Duplicate { url: String, existing: String },
    Discarded,
}

/// Mutable state of one run. Owned by the orchestrator alone; workers only
/// reach it through the events they send.
pub(crate) struct RunState {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    max_articles: usize,
    dedup: Deduplicator,
    accepted: usize,
    duplicates: usize,
    failed_by_kind: BTreeMap<FailureKind, usize>,
    sources: Vec<SourceReport>,
    source_index: HashMap<String, usize>,
    categories: BTreeMap<String, usize>,
    deadline_hit: bool,
    cap_reached: bool,
    discarded_after_stop: usize,
}

impl RunState {
    pub(crate) fn new<'a>(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        max_articles: usize,
        source_names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let sources: Vec<SourceReport> = source_names
            .into_iter()
            .map(|name| SourceReport {
                name: name.to_owned(),
                ..SourceReport::default()
            })
            .collect();
        let source_index = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self {
            run_id,
            started_at,
            max_articles,
            dedup: Deduplicator::new(),
            accepted: 0,
            duplicates: 0,
            failed_by_kind: BTreeMap::new(),
            sources,
            source_index,
            categories: BTreeMap::new(),
            deadline_hit: false,
            cap_reached: false,
            discarded_after_stop: 0,
        }
    }

    fn source_mut(&mut self, name: &str) -> &mut SourceReport {
        let idx = match self.source_index.get(name) {
            Some(&idx) => idx,
            None => {
                self.sources.push(SourceReport {
                    name: name.to_owned(),
                    ..SourceReport::default()
                });
                let idx = self.sources.len() - 1;
                self.source_index.insert(name.to_owned(), idx);
                idx
            }
        };
        &mut self.sources[idx]
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.deadline_hit || self.cap_reached
    }

    pub(crate) fn deadline_hit(&self) -> bool {
        self.deadline_hit
    }

    pub(crate) fn mark_deadline_hit(&mut self) {
        self.deadline_hit = true;
    }

    pub(crate) fn record_discovered(&mut self, source: &str, count: usize) {
        self.source_mut(source).discovered = count;
    }

    pub(crate) fn record_attempts(&mut self, source: &str, attempts: u32) {
        self.source_mut(source).fetch_attempts = attempts;
    }

    pub(crate) fn record_failure(&mut self, source: &str, kind: FailureKind) {
        *self.failed_by_kind.entry(kind).or_insert(0) += 1;
        self.source_mut(source).failed += 1;
    }

    pub(crate) fn record_discovery_failure(&mut self, source: &str, reason: String) {
        self.record_failure(source, FailureKind::SourceDiscovery);
        self.source_mut(source).discovery_error = Some(reason);
    }

    /// Count a candidate that arrived after the workers were abandoned.
    pub(crate) fn record_discarded(&mut self) {
        self.discarded_after_stop += 1;
    }

    pub(crate) fn record_sink_failure(&mut self) {
        *self.failed_by_kind.entry(FailureKind::SinkWrite).or_insert(0) += 1;
    }

    /// Dedup `candidate` and decide whether it may be written.
    ///
    /// After a stop nothing is written, and since writes are committed one at
    /// a time the cap can never be overshot.
    pub(crate) fn offer(&mut self, candidate: Candidate, now: DateTime<Utc>) -> Offer {
        if self.is_stopped() || self.accepted >= self.max_articles {
            self.discarded_after_stop += 1;
            return Offer::Discarded;
        }
        match self.dedup.admit(&candidate) {
            Admission::Accepted => Offer::Write(candidate.into_record(now)),
            Admission::DuplicateOf(existing) => {
                self.duplicates += 1;
                self.source_mut(&candidate.source).duplicates += 1;
                Offer::Duplicate {
                    url: candidate.url,
                    existing,
                }
            }
        }
    }

    /// Count a record the sink accepted. Returns `true` when this write
    /// reached the article cap.
    pub(crate) fn commit(&mut self, record: &ArticleRecord) -> bool {
        self.accepted += 1;
        self.source_mut(&record.source).accepted += 1;
        *self.categories.entry(record.category.clone()).or_insert(0) += 1;
        if self.accepted >= self.max_articles && !self.cap_reached {
            self.cap_reached = true;
            return true;
        }
        false
    }

    pub(crate) fn into_summary(self, finished_at: DateTime<Utc>) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            accepted: self.accepted,
            duplicates: self.duplicates,
            failed_by_kind: self.failed_by_kind,
            sources: self.sources,
            categories: self.categories,
            deadline_hit: self.deadline_hit,
            cap_reached: self.cap_reached,
            discarded_after_stop: self.discarded_after_stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(source: &str, title: &str, url: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            description: title.to_string(),
            url: url.to_string(),
            category: "world".to_string(),
            source: source.to_string(),
            published_at: None,
            raw_content_hash: String::new(),
        }
    }

    fn state(max: usize) -> RunState {
        RunState::new(Uuid::new_v4(), Utc::now(), max, ["a", "b"])
    }

    #[test]
    fn cap_stops_further_writes() {
        let mut st = state(1);
        let Offer::Write(record) = st.offer(
            candidate("a", "First story of the day", "https://x.test/1"),
            Utc::now(),
        ) else {
            panic!("first candidate should be written");
        };
        assert!(st.commit(&record));
        assert_eq!(
            st.offer(
                candidate("b", "Second story of the day", "https://x.test/2"),
                Utc::now()
            ),
            Offer::Discarded
        );

        let summary = st.into_summary(Utc::now());
        assert_eq!(summary.accepted, 1);
        assert!(summary.cap_reached);
        assert_eq!(summary.discarded_after_stop, 1);
        assert_eq!(summary.categories.get("world"), Some(&1));
        assert_eq!(summary.source("a").unwrap().accepted, 1);
    }

    #[test]
    fn duplicates_are_counted_per_source() {
        let mut st = state(10);
        let _ = st.offer(
            candidate("a", "Same story everywhere today", "https://x.test/s"),
            Utc::now(),
        );
        let offer = st.offer(
            candidate("b", "Same story everywhere today", "https://x.test/s"),
            Utc::now(),
        );
        assert!(matches!(offer, Offer::Duplicate { .. }));

        let summary = st.into_summary(Utc::now());
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.source("b").unwrap().duplicates, 1);
    }

    #[test]
    fn deadline_discards_late_candidates() {
        let mut st = state(10);
        st.mark_deadline_hit();
        assert_eq!(
            st.offer(
                candidate("a", "Late arriving story here", "https://x.test/late"),
                Utc::now()
            ),
            Offer::Discarded
        );
        assert!(st.is_stopped());
    }

    #[test]
    fn failures_are_bucketed_by_kind() {
        let mut st = state(10);
        st.record_failure("a", FailureKind::PermanentHttp);
        st.record_failure("a", FailureKind::PermanentHttp);
        st.record_discovery_failure("b", "listing timed out".to_string());

        let summary = st.into_summary(Utc::now());
        assert_eq!(summary.failed(FailureKind::PermanentHttp), 2);
        assert_eq!(summary.failed(FailureKind::SourceDiscovery), 1);
        assert_eq!(summary.failed_total(), 3);
        assert_eq!(
            summary.source("b").unwrap().discovery_error.as_deref(),
            Some("listing timed out")
        );
    }

    #[test]
    fn display_mentions_counts_and_sources() {
        let mut st = state(10);
        st.record_discovery_failure("b", "unreachable".to_string());
        let rendered = st.into_summary(Utc::now()).to_string();
        assert!(rendered.contains("accepted: 0"));
        assert!(rendered.contains("source_discovery: 1"));
        assert!(rendered.contains("b: discovered 0"));
        assert!(rendered.contains("discovery failed: unreachable"));
    }
}
