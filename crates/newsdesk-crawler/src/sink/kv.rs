//! Url-keyed key-value output with upsert semantics.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use newsdesk_core::ArticleRecord;

use super::Sink;
use crate::error::SinkError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace the item stored under `key`.
    async fn put(&self, key: &str, item: Value) -> Result<(), SinkError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, SinkError>;
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored item decoded as an [`ArticleRecord`], in key order.
    /// Items that do not decode are skipped.
    #[must_use]
    pub fn records(&self) -> Vec<ArticleRecord> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, item: Value) -> Result<(), SinkError> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), item);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, SinkError> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

/// A JSON object on disk mapping url to item, rewritten after every put
/// through a temporary file and a rename.
pub struct JsonFileStore {
    path: PathBuf,
    items: tokio::sync::Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading its items if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the file cannot be read or is not a JSON
    /// object.
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        let items = match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), items = items.len(), "key-value store opened");
        Ok(Self {
            path: path.to_path_buf(),
            items: tokio::sync::Mutex::new(items),
        })
    }

    async fn persist(&self, items: &BTreeMap<String, Value>) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(items)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn put(&self, key: &str, item: Value) -> Result<(), SinkError> {
        let mut items = self.items.lock().await;
        let previous = items.insert(key.to_owned(), item);
        if let Err(e) = self.persist(&items).await {
            match previous {
                Some(prev) => items.insert(key.to_owned(), prev),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, SinkError> {
        Ok(self.items.lock().await.get(key).cloned())
    }
}

pub struct KeyValueSink<S> {
    store: S,
}

impl<S: KeyValueStore> KeyValueSink<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: KeyValueStore> Sink for KeyValueSink<S> {
    async fn write(&mut self, record: &ArticleRecord) -> Result<(), SinkError> {
        let item = serde_json::to_value(record)?;
        self.store.put(&record.url, item).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
