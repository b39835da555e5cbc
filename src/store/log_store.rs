use super::backend::KeyValueBackend;
use crate::config::{StoreConfig, StoreOrder};
use crate::entry::LogEntry;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Ordered log of entries kept under a single durable key
pub struct LogStore {
    backend: Arc<dyn KeyValueBackend>,
    key: String,
    order: StoreOrder,
    max_entries: usize,
    // Serializes read-modify-write cycles inside this process
    write_lock: Mutex<()>,
}

impl LogStore {
    pub fn new(
        backend: Arc<dyn KeyValueBackend>,
        key: impl Into<String>,
        order: StoreOrder,
        max_entries: usize,
    ) -> Self {
        Self {
            backend,
            key: key.into(),
            order,
            max_entries: max_entries.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(
        backend: Arc<dyn KeyValueBackend>,
        key: impl Into<String>,
        config: &StoreConfig,
    ) -> Self {
        Self::new(backend, key, config.order, config.max_entries)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn order(&self) -> StoreOrder {
        self.order
    }

    pub fn backend(&self) -> Arc<dyn KeyValueBackend> {
        Arc::clone(&self.backend)
    }

    /// Load every entry in storage order. Absent or corrupt state reads as empty.
    pub async fn load(&self) -> Vec<LogEntry> {
        let raw = match self.backend.read(&self.key).await {
            Some(raw) => raw,
            None => return Vec::new(),
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Stored log {} is not valid JSON, treating as empty: {}", self.key, e);
                return Vec::new();
            }
        };

        let items = match parsed {
            Value::Array(items) => items,
            other => {
                warn!(
                    "Stored log {} is not an array ({}), treating as empty",
                    self.key,
                    json_kind(&other)
                );
                return Vec::new();
            }
        };

        let total = items.len();
        let entries: Vec<LogEntry> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<LogEntry>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping undecodable entry in {}: {}", self.key, e);
                    None
                }
            })
            .collect();

        debug!("Loaded {}/{} entries from {}", entries.len(), total, self.key);
        entries
    }

    /// Overwrite the persisted sequence, dropping the oldest beyond the limit
    pub async fn save(&self, entries: Vec<LogEntry>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save_unlocked(entries).await
    }

    async fn save_unlocked(&self, mut entries: Vec<LogEntry>) -> Result<()> {
        if entries.len() > self.max_entries {
            let dropped = entries.len() - self.max_entries;
            match self.order {
                StoreOrder::NewestFirst => entries.truncate(self.max_entries),
                StoreOrder::AppendLast => {
                    entries.drain(..dropped);
                }
            }
            debug!("Dropped {} oldest entries from {}", dropped, self.key);
        }

        let encoded = serde_json::to_string(&entries).map_err(crate::error::StoreError::from)?;
        self.backend.write(&self.key, &encoded).await?;
        Ok(())
    }

    /// Add one entry at the newest end
    pub async fn append(&self, entry: LogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        let id = entry.id.clone();

        match self.order {
            StoreOrder::NewestFirst => entries.insert(0, entry),
            StoreOrder::AppendLast => entries.push(entry),
        }

        self.save_unlocked(entries).await?;
        info!("Appended entry {} to {}", id, self.key);
        Ok(())
    }

    /// Remove the entry with the given id. Returns whether one was removed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);

        if entries.len() == before {
            debug!("No entry {} in {}", id, self.key);
            return Ok(false);
        }

        self.save_unlocked(entries).await?;
        info!("Removed entry {} from {}", id, self.key);
        Ok(true)
    }

    /// Delete the underlying key entirely
    pub async fn wipe_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.remove(&self.key).await?;
        info!("Wiped all entries in {}", self.key);
        Ok(())
    }

    pub async fn find(&self, id: &str) -> Option<LogEntry> {
        self.load().await.into_iter().find(|entry| entry.id == id)
    }

    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries newest-first regardless of storage order
    pub async fn load_newest_first(&self) -> Vec<LogEntry> {
        let mut entries = self.load().await;
        if self.order == StoreOrder::AppendLast {
            entries.reverse();
        }
        entries
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
