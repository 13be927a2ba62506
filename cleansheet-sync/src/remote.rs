//! Remote object-store contract and its implementations.
//!
//! The engine talks to blob storage through [`ObjectStore`]: flat JSON
//! objects addressed by path, nothing more. [`HttpObjectStore`] speaks to a
//! blob endpoint authorized by a query token; [`MemoryObjectStore`] backs
//! the test suites and can inject failures and latency.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// A remote blob as reported by a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteObject {
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

/// Flat JSON blob storage addressed by path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `None` when the path does not exist.
    async fn get(&self, path: &str) -> SyncResult<Option<Value>>;
    async fn put(&self, path: &str, value: &Value) -> SyncResult<()>;
    async fn delete(&self, path: &str) -> SyncResult<()>;
    async fn list(&self, prefix: &str) -> SyncResult<Vec<RemoteObject>>;
}

/// Blob client over HTTP. Authorization travels as a pre-signed query token
/// appended to every request, SAS style.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(SyncError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        match &self.token {
            Some(token) => format!("{}/{path}?{token}", self.base_url),
            None => format!("{}/{path}", self.base_url),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    name: String,
    last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct ListResponse {
    objects: Vec<ListEntry>,
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, path: &str) -> SyncResult<Option<Value>> {
        let resp = self.client.get(self.url(path)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Ok(Some(resp.json().await?))
    }

    async fn put(&self, path: &str, value: &Value) -> SyncResult<()> {
        debug!("uploading {path}");
        self.client
            .put(self.url(path))
            .json(value)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> SyncResult<()> {
        let resp = self.client.delete(self.url(path)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> SyncResult<Vec<RemoteObject>> {
        let url = match &self.token {
            Some(token) => format!("{}/?prefix={prefix}&{token}", self.base_url),
            None => format!("{}/?prefix={prefix}", self.base_url),
        };
        let resp: ListResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?
            .json()
            .await?;
        Ok(resp
            .objects
            .into_iter()
            .map(|e| RemoteObject {
                name: e.name,
                last_modified: e.last_modified,
                size: e.size,
            })
            .collect())
    }
}

/// In-memory object store for tests, with failure and latency injection.
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Value, DateTime<Utc>)>>,
    fail_all: AtomicBool,
    /// Fail every put after this many have succeeded (usize::MAX = never).
    fail_puts_after: AtomicUsize,
    put_count: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_all: AtomicBool::new(false),
            fail_puts_after: AtomicUsize::new(usize::MAX),
            put_count: AtomicUsize::new(0),
            latency: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::Release);
    }

    /// Lets `n` further puts succeed, then fails every one after that.
    pub fn fail_puts_after(&self, n: usize) {
        self.put_count.store(0, Ordering::Release);
        self.fail_puts_after.store(n, Ordering::Release);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn objects(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::Acquire)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    async fn simulate(&self) -> SyncResult<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_all.load(Ordering::Acquire) {
            return Err(SyncError::RemoteUnavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, path: &str) -> SyncResult<Option<Value>> {
        self.simulate().await?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(v, _)| v.clone()))
    }

    async fn put(&self, path: &str, value: &Value) -> SyncResult<()> {
        self.simulate().await?;
        let done = self.put_count.fetch_add(1, Ordering::AcqRel);
        if done >= self.fail_puts_after.load(Ordering::Acquire) {
            return Err(SyncError::RemoteUnavailable(
                "injected put failure".to_string(),
            ));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (value.clone(), Utc::now()));
        Ok(())
    }

    async fn delete(&self, path: &str) -> SyncResult<()> {
        self.simulate().await?;
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> SyncResult<Vec<RemoteObject>> {
        self.simulate().await?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, (value, modified))| RemoteObject {
                name: name.clone(),
                last_modified: Some(*modified),
                size: value.to_string().len() as u64,
            })
            .collect())
    }
}
