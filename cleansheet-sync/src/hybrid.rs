//! Hybrid read/write for small preference-style values.
//!
//! Reads prefer the remote copy and fall back to the local cache when the
//! remote is unreachable; every successful remote read refreshes the cache.
//! Writes land locally immediately and reach the remote through a per-key
//! debounce so rapid editing produces one upload, not one per keystroke.

use crate::error::SyncResult;
use crate::remote::ObjectStore;
use cleansheet_storage::StorageService;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

fn cache_key(key: &str) -> String {
    format!("hybrid_cache_{key}")
}

/// Remote-first reader, debounced remote writer.
pub struct HybridStore {
    storage: Arc<StorageService>,
    remote: Arc<dyn ObjectStore>,
    debounce: Duration,
    /// One pending upload task per key; a re-save aborts and replaces it.
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HybridStore {
    pub fn new(
        storage: Arc<StorageService>,
        remote: Arc<dyn ObjectStore>,
        debounce: Duration,
    ) -> Self {
        Self {
            storage,
            remote,
            debounce,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Remote first; any remote failure or absence falls back to the local
    /// cache. A successful remote read is mirrored into the cache so the
    /// fallback stays fresh.
    pub async fn load(&self, key: &str) -> SyncResult<Option<Value>> {
        match self.remote.get(key).await {
            Ok(Some(value)) => {
                self.storage.save_setting(&cache_key(key), value.clone()).await?;
                Ok(Some(value))
            }
            Ok(None) => Ok(self.storage.get_setting(&cache_key(key)).await?),
            Err(e) => {
                warn!("remote load of '{key}' failed, using local cache: {e}");
                Ok(self.storage.get_setting(&cache_key(key)).await?)
            }
        }
    }

    /// Local write immediately; remote write after the debounce window.
    /// Saving the same key again restarts its timer.
    pub async fn save(&self, key: &str, value: Value) -> SyncResult<()> {
        self.storage.save_setting(&cache_key(key), value.clone()).await?;

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(key) {
            previous.abort();
        }

        let remote = self.remote.clone();
        let path = key.to_string();
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            match remote.put(&path, &value).await {
                Ok(()) => debug!("debounced upload of '{path}' complete"),
                // Local copy is authoritative; the next save retries.
                Err(e) => warn!("debounced upload of '{path}' failed: {e}"),
            }
        });
        pending.insert(key.to_string(), handle);
        Ok(())
    }

    /// Pushes every pending write now instead of waiting out its window.
    pub async fn flush(&self) {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.pending.lock().await.drain().collect();
        for (key, handle) in handles {
            handle.abort();
            let value = match self.storage.get_setting(&cache_key(&key)).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!("flush read of '{key}' failed: {e}");
                    continue;
                }
            };
            if let Err(e) = self.remote.put(&key, &value).await {
                warn!("flush upload of '{key}' failed: {e}");
            }
        }
    }
}
