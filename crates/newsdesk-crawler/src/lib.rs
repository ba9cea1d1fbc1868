//! Concurrent crawl-and-dedup pipeline.
//!
//! The [`Orchestrator`] drives one [`SourceWorker`] per configured source.
//! Workers discover article links, fetch them through the shared
//! [`FetchClient`] under [`RetryPolicy`] and [`HostRateLimiter`] control, and
//! report [`Candidate`]s back. The orchestrator deduplicates them and streams
//! accepted [`ArticleRecord`](newsdesk_core::ArticleRecord)s into a [`Sink`].

pub mod analyzer;
pub mod dates;
pub mod dedup;
pub mod discover;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod orchestrator;
pub mod proxy;
pub mod rate_limit;
pub mod retry;
pub mod settings;
pub mod sink;
pub mod summary;
pub mod worker;

mod text;

pub use analyzer::{Analysis, AnalyzerError, ContentAnalyzer, DisabledAnalyzer, OpenAiAnalyzer};
pub use dedup::{Admission, Deduplicator};
pub use discover::{CompiledProfile, ListingEntry};
pub use error::{CrawlError, ExtractionFailure, FailureKind, SinkError};
pub use extract::{Candidate, Extractor};
pub use fetch::{FetchClient, FetchFailure, FetchOutcome, FetchedPage};
pub use orchestrator::Orchestrator;
pub use proxy::ProxyRotator;
pub use rate_limit::{HostPermit, HostRateLimiter};
pub use retry::{GiveUpReason, RetryDecision, RetryPolicy};
pub use settings::CrawlSettings;
pub use sink::{
    clean_csv, open_sink, CleanReport, CsvSink, JsonFileStore, KeyValueSink, KeyValueStore,
    MemoryStore, Sink,
};
pub use summary::{RunSummary, SourceReport};
pub use worker::{SourceWorker, WorkerEvent, WorkerState};
