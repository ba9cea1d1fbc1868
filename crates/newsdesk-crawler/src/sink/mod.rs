//! Destinations for accepted [`ArticleRecord`]s.
//!
//! Records reach a sink one at a time, as soon as they are accepted, in no
//! particular order across sources. Every sink is idempotent on `url`.

mod csv;
mod kv;

use std::path::Path;

use async_trait::async_trait;

use newsdesk_core::{ArticleRecord, SinkKind};

use crate::error::SinkError;

pub use self::csv::{clean_csv, CleanReport, CsvSink};
pub use self::kv::{JsonFileStore, KeyValueSink, KeyValueStore, MemoryStore};

#[async_trait]
pub trait Sink: Send {
    /// Persist one record. Writing a url that is already stored must not
    /// produce a second stored row.
    async fn write(&mut self, record: &ArticleRecord) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;
}

/// Open the sink selected by configuration.
///
/// # Errors
///
/// Returns [`SinkError`] when the output file or store cannot be opened.
pub async fn open_sink(
    kind: SinkKind,
    path: &Path,
    delimiter: u8,
) -> Result<Box<dyn Sink>, SinkError> {
    match kind {
        SinkKind::Csv => Ok(Box::new(CsvSink::open(path, delimiter).await?)),
        SinkKind::KeyValue => {
            let store = JsonFileStore::open(path).await?;
            Ok(Box::new(KeyValueSink::new(store)))
        }
    }
}
