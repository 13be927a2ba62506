//! Generic record store contract and the in-memory reference backend.
//!
//! A backend is a table-oriented store addressed by table name + primary
//! key, holding JSON object records. The embedded production backend and
//! the in-memory one used in tests both implement [`RecordStore`]; the
//! encryption middleware wraps any of them.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use cleansheet_types::PersonaId;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Tables known to the core schema.
pub const TABLES: [&str; 10] = [
    "profiles",
    "experiences",
    "stories",
    "jobs",
    "goals",
    "portfolio",
    "documents",
    "diagrams",
    "artifacts",
    "settings",
];

/// Field-equality filter applied to `get_all`/`count`.
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    fields: BTreeMap<String, Value>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The common case: all records belonging to one persona.
    pub fn persona(persona_id: &PersonaId) -> Self {
        Self::new().with_field("personaId", Value::String(persona_id.as_str().to_string()))
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.fields
            .iter()
            .all(|(name, expected)| record.get(name) == Some(expected))
    }
}

/// One operation inside an atomic transaction batch.
#[derive(Clone, Debug)]
pub enum TxOp {
    Put { table: String, record: Value },
    Delete { table: String, key: String },
    Clear { table: String },
}

/// Storage usage snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageUsage {
    pub bytes_used: u64,
    pub record_count: usize,
}

/// Async contract every storage backend implements.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn is_available(&self) -> bool;
    async fn close(&self) -> StorageResult<()>;

    async fn get(&self, table: &str, key: &str) -> StorageResult<Option<Value>>;
    async fn get_all(&self, table: &str, filter: Option<&RecordFilter>)
        -> StorageResult<Vec<Value>>;
    /// Upsert by primary key. Returns the record's key.
    async fn put(&self, table: &str, record: Value) -> StorageResult<String>;
    /// Insert; colliding with an existing key is an error.
    async fn add(&self, table: &str, record: Value) -> StorageResult<String>;
    /// Idempotent: deleting a missing key is not an error.
    async fn delete(&self, table: &str, key: &str) -> StorageResult<()>;
    async fn exists(&self, table: &str, key: &str) -> StorageResult<bool>;

    async fn bulk_get(&self, table: &str, keys: &[String]) -> StorageResult<Vec<Option<Value>>>;
    async fn bulk_put(&self, table: &str, records: Vec<Value>) -> StorageResult<()>;
    async fn bulk_add(&self, table: &str, records: Vec<Value>) -> StorageResult<Vec<String>>;
    async fn bulk_delete(&self, table: &str, keys: &[String]) -> StorageResult<()>;

    /// Applies the batch atomically: either every operation is visible
    /// afterwards or none is.
    async fn apply_transaction(&self, ops: Vec<TxOp>) -> StorageResult<()>;

    async fn count(&self, table: &str, filter: Option<&RecordFilter>) -> StorageResult<usize>;
    async fn clear_table(&self, table: &str) -> StorageResult<()>;
    async fn clear_all(&self) -> StorageResult<()>;
    async fn get_usage(&self) -> StorageResult<StorageUsage>;

    fn generate_id(&self) -> String;
    fn table_names(&self) -> Vec<String>;
}

/// Extracts the primary key from a record (`id` field).
pub fn record_key(record: &Value) -> StorageResult<String> {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StorageError::InvalidRecord("record has no id".to_string())),
    }
}

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// In-memory backend. Reference implementation of the contract; also the
/// backend used throughout the test suites.
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        for table in TABLES {
            tables.insert(table.to_string(), BTreeMap::new());
        }
        Self {
            tables: RwLock::new(tables),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_op(tables: &mut Tables, op: TxOp) -> StorageResult<()> {
    match op {
        TxOp::Put { table, record } => {
            let key = record_key(&record)?;
            tables.entry(table).or_default().insert(key, record);
        }
        TxOp::Delete { table, key } => {
            tables.entry(table).or_default().remove(&key);
        }
        TxOp::Clear { table } => {
            tables.entry(table).or_default().clear();
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> StorageResult<Option<Value>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn get_all(
        &self,
        table: &str,
        filter: Option<&RecordFilter>,
    ) -> StorageResult<Vec<Value>> {
        let tables = self.tables.read().unwrap();
        let records = tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|r| filter.map(|f| f.matches(r)).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }

    async fn put(&self, table: &str, record: Value) -> StorageResult<String> {
        let key = record_key(&record)?;
        let mut tables = self.tables.write().unwrap();
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.clone(), record);
        Ok(key)
    }

    async fn add(&self, table: &str, record: Value) -> StorageResult<String> {
        let key = record_key(&record)?;
        let mut tables = self.tables.write().unwrap();
        let t = tables.entry(table.to_string()).or_default();
        if t.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: table.to_string(),
                key,
            });
        }
        t.insert(key.clone(), record);
        Ok(key)
    }

    async fn delete(&self, table: &str, key: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap();
        if let Some(t) = tables.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, table: &str, key: &str) -> StorageResult<bool> {
        let tables = self.tables.read().unwrap();
        Ok(tables.get(table).is_some_and(|t| t.contains_key(key)))
    }

    async fn bulk_get(&self, table: &str, keys: &[String]) -> StorageResult<Vec<Option<Value>>> {
        let tables = self.tables.read().unwrap();
        let t = tables.get(table);
        Ok(keys
            .iter()
            .map(|k| t.and_then(|t| t.get(k)).cloned())
            .collect())
    }

    async fn bulk_put(&self, table: &str, records: Vec<Value>) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap();
        let t = tables.entry(table.to_string()).or_default();
        for record in records {
            let key = record_key(&record)?;
            t.insert(key, record);
        }
        Ok(())
    }

    async fn bulk_add(&self, table: &str, records: Vec<Value>) -> StorageResult<Vec<String>> {
        let mut tables = self.tables.write().unwrap();
        let t = tables.entry(table.to_string()).or_default();
        let mut keys = Vec::with_capacity(records.len());
        for record in &records {
            let key = record_key(record)?;
            if t.contains_key(&key) {
                return Err(StorageError::DuplicateKey {
                    table: table.to_string(),
                    key,
                });
            }
            keys.push(key);
        }
        for (key, record) in keys.iter().zip(records) {
            t.insert(key.clone(), record);
        }
        Ok(keys)
    }

    async fn bulk_delete(&self, table: &str, keys: &[String]) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap();
        if let Some(t) = tables.get_mut(table) {
            for key in keys {
                t.remove(key);
            }
        }
        Ok(())
    }

    async fn apply_transaction(&self, ops: Vec<TxOp>) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap();
        // Stage on a copy; swap in only if every op succeeds.
        let mut staged = tables.clone();
        for op in ops {
            apply_op(&mut staged, op)?;
        }
        *tables = staged;
        Ok(())
    }

    async fn count(&self, table: &str, filter: Option<&RecordFilter>) -> StorageResult<usize> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|r| filter.map(|f| f.matches(r)).unwrap_or(true))
                    .count()
            })
            .unwrap_or(0))
    }

    async fn clear_table(&self, table: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap();
        if let Some(t) = tables.get_mut(table) {
            t.clear();
        }
        Ok(())
    }

    async fn clear_all(&self) -> StorageResult<()> {
        let mut tables = self.tables.write().unwrap();
        for t in tables.values_mut() {
            t.clear();
        }
        Ok(())
    }

    async fn get_usage(&self) -> StorageResult<StorageUsage> {
        let tables = self.tables.read().unwrap();
        let mut usage = StorageUsage::default();
        for t in tables.values() {
            for record in t.values() {
                usage.record_count += 1;
                usage.bytes_used += record.to_string().len() as u64;
            }
        }
        Ok(usage)
    }

    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn table_names(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap();
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }
}
