//! Field-level encryption middleware.
//!
//! Wraps any [`RecordStore`] and transparently encrypts a configured set of
//! fields in a configured set of tables. Structural fields (id, personaId,
//! name, timestamps) stay plaintext so the store remains indexable and
//! filterable without decryption.
//!
//! Stored records carry an `_encrypted` array naming the fields that were
//! encrypted; in code that envelope is the explicit [`EncryptedRecord`]
//! type rather than an ad-hoc extra property.

use crate::backend::{RecordFilter, RecordStore, StorageUsage, TxOp};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use cleansheet_crypto::{self_test, CryptoProvider};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Marker property naming the encrypted fields of a stored record.
pub const ENCRYPTED_MARKER: &str = "_encrypted";

/// Entity tables whose records may contain sensitive content.
pub const DEFAULT_ENCRYPTED_TABLES: [&str; 9] = [
    "profiles",
    "experiences",
    "stories",
    "jobs",
    "goals",
    "portfolio",
    "documents",
    "diagrams",
    "artifacts",
];

/// Free-text content fields, checked by presence rather than per table so
/// the same field name is treated uniformly everywhere it appears.
pub const DEFAULT_ENCRYPTED_FIELDS: [&str; 11] = [
    "content",
    "blocks",
    "diagramData",
    "data",
    "description",
    "notes",
    "summary",
    "situation",
    "task",
    "action",
    "result",
];

/// A record as it sits on disk: plaintext structural fields, ciphertext
/// tokens for sensitive ones, plus the set of field names that were
/// encrypted (so decryption knows what to reverse and a failed field cannot
/// corrupt its neighbors).
#[derive(Clone, Debug, PartialEq)]
pub struct EncryptedRecord {
    pub fields: Map<String, Value>,
    pub encrypted_field_names: BTreeSet<String>,
}

impl EncryptedRecord {
    /// Parses the stored JSON shape. Records with no `_encrypted` marker
    /// (written before encryption was enabled) have an empty name set.
    pub fn from_stored(value: Value) -> StorageResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(StorageError::InvalidRecord(
                "stored record is not an object".to_string(),
            ));
        };
        let encrypted_field_names = match fields.remove(ENCRYPTED_MARKER) {
            Some(Value::Array(names)) => names
                .into_iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect(),
            _ => BTreeSet::new(),
        };
        Ok(Self {
            fields,
            encrypted_field_names,
        })
    }

    /// Produces the stored JSON shape with the `_encrypted` marker.
    pub fn into_stored(mut self) -> Value {
        let names: Vec<Value> = self
            .encrypted_field_names
            .into_iter()
            .map(Value::String)
            .collect();
        self.fields.insert(ENCRYPTED_MARKER.to_string(), Value::Array(names));
        Value::Object(self.fields)
    }
}

/// Result of decrypting one field: the plaintext either parses back into
/// structured data or stays raw text. Determined by a best-effort parse,
/// since some fields hold objects and others plain prose.
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptedValue {
    Structured(Value),
    Text(String),
}

impl DecryptedValue {
    pub fn parse(plaintext: String) -> Self {
        match serde_json::from_str::<Value>(&plaintext) {
            Ok(value) => DecryptedValue::Structured(value),
            Err(_) => DecryptedValue::Text(plaintext),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            DecryptedValue::Structured(value) => value,
            DecryptedValue::Text(text) => Value::String(text),
        }
    }
}

/// Encryption middleware over a wrapped backend.
pub struct EncryptedStore {
    backend: Arc<dyn RecordStore>,
    crypto: Arc<dyn CryptoProvider>,
    encrypted_tables: RwLock<BTreeSet<String>>,
    encrypted_fields: RwLock<BTreeSet<String>>,
    initialized: AtomicBool,
}

impl EncryptedStore {
    pub fn new(backend: Arc<dyn RecordStore>, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            backend,
            crypto,
            encrypted_tables: RwLock::new(
                DEFAULT_ENCRYPTED_TABLES.iter().map(|s| s.to_string()).collect(),
            ),
            encrypted_fields: RwLock::new(
                DEFAULT_ENCRYPTED_FIELDS.iter().map(|s| s.to_string()).collect(),
            ),
            initialized: AtomicBool::new(false),
        }
    }

    /// The wrapped backend, for callers that must bypass encryption
    /// entirely (settings).
    pub fn backend(&self) -> &Arc<dyn RecordStore> {
        &self.backend
    }

    pub fn is_encrypted_table(&self, table: &str) -> bool {
        self.encrypted_tables.read().unwrap().contains(table)
    }

    pub fn add_encrypted_field(&self, field: impl Into<String>) {
        self.encrypted_fields.write().unwrap().insert(field.into());
    }

    pub fn remove_encrypted_field(&self, field: &str) {
        self.encrypted_fields.write().unwrap().remove(field);
    }

    pub fn add_encrypted_table(&self, table: impl Into<String>) {
        self.encrypted_tables.write().unwrap().insert(table.into());
    }

    /// Encrypts the configured fields of a record in place.
    ///
    /// A field that fails to encrypt keeps its plaintext value and is *not*
    /// marked encrypted — availability over confidentiality for that field,
    /// never a failed write.
    fn encrypt_record(&self, record: Value) -> StorageResult<Value> {
        let Value::Object(mut fields) = record else {
            return Err(StorageError::InvalidRecord(
                "record is not an object".to_string(),
            ));
        };

        let mut encrypted_field_names = BTreeSet::new();
        let field_config = self.encrypted_fields.read().unwrap().clone();

        for name in &field_config {
            let Some(value) = fields.get(name) else { continue };
            if value.is_null() {
                continue;
            }

            let plaintext = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other)?,
            };

            match self.crypto.encrypt(&plaintext) {
                Ok(token) => {
                    fields.insert(name.clone(), Value::String(token));
                    encrypted_field_names.insert(name.clone());
                }
                Err(e) => {
                    warn!("failed to encrypt field '{name}', keeping plaintext: {e}");
                }
            }
        }

        Ok(EncryptedRecord {
            fields,
            encrypted_field_names,
        }
        .into_stored())
    }

    /// Decrypts a stored record for callers.
    ///
    /// A field that fails to decrypt is nulled (treated as corrupted); the
    /// rest of the record stays intact. The `_encrypted` marker is stripped
    /// from the returned value.
    fn decrypt_record(&self, stored: Value) -> StorageResult<Value> {
        let record = EncryptedRecord::from_stored(stored)?;
        if record.encrypted_field_names.is_empty() {
            return Ok(Value::Object(record.fields));
        }

        let mut fields = record.fields;
        for name in &record.encrypted_field_names {
            let Some(Value::String(token)) = fields.get(name) else { continue };
            match self.crypto.decrypt(token) {
                Ok(plaintext) => {
                    fields.insert(name.clone(), DecryptedValue::parse(plaintext).into_value());
                }
                Err(e) => {
                    warn!("failed to decrypt field '{name}', nulling it: {e}");
                    fields.insert(name.clone(), Value::Null);
                }
            }
        }
        Ok(Value::Object(fields))
    }

    fn maybe_encrypt(&self, table: &str, record: Value) -> StorageResult<Value> {
        if self.is_encrypted_table(table) {
            self.encrypt_record(record)
        } else {
            Ok(record)
        }
    }

    fn maybe_decrypt(&self, table: &str, record: Value) -> StorageResult<Value> {
        if self.is_encrypted_table(table) {
            self.decrypt_record(record)
        } else {
            Ok(record)
        }
    }
}

#[async_trait]
impl RecordStore for EncryptedStore {
    /// Initializes the wrapped backend, then runs an encrypt/decrypt
    /// self-test. Fails closed: a broken provider must never let the store
    /// silently run unencrypted.
    async fn initialize(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend.initialize().await?;

        if self_test(self.crypto.as_ref()).is_err() {
            return Err(StorageError::EncryptionSelfTest);
        }

        self.initialized.store(true, Ordering::Release);
        info!("encrypted store initialized");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.initialized.store(false, Ordering::Release);
        self.backend.close().await
    }

    async fn get(&self, table: &str, key: &str) -> StorageResult<Option<Value>> {
        match self.backend.get(table, key).await? {
            Some(record) => Ok(Some(self.maybe_decrypt(table, record)?)),
            None => Ok(None),
        }
    }

    async fn get_all(
        &self,
        table: &str,
        filter: Option<&RecordFilter>,
    ) -> StorageResult<Vec<Value>> {
        let records = self.backend.get_all(table, filter).await?;
        records
            .into_iter()
            .map(|r| self.maybe_decrypt(table, r))
            .collect()
    }

    async fn put(&self, table: &str, record: Value) -> StorageResult<String> {
        let record = self.maybe_encrypt(table, record)?;
        self.backend.put(table, record).await
    }

    async fn add(&self, table: &str, record: Value) -> StorageResult<String> {
        let record = self.maybe_encrypt(table, record)?;
        self.backend.add(table, record).await
    }

    async fn delete(&self, table: &str, key: &str) -> StorageResult<()> {
        self.backend.delete(table, key).await
    }

    async fn exists(&self, table: &str, key: &str) -> StorageResult<bool> {
        self.backend.exists(table, key).await
    }

    async fn bulk_get(&self, table: &str, keys: &[String]) -> StorageResult<Vec<Option<Value>>> {
        let records = self.backend.bulk_get(table, keys).await?;
        records
            .into_iter()
            .map(|r| r.map(|r| self.maybe_decrypt(table, r)).transpose())
            .collect()
    }

    async fn bulk_put(&self, table: &str, records: Vec<Value>) -> StorageResult<()> {
        // Per-item encryption, never table-level encryption of the array.
        let records = records
            .into_iter()
            .map(|r| self.maybe_encrypt(table, r))
            .collect::<StorageResult<Vec<_>>>()?;
        self.backend.bulk_put(table, records).await
    }

    async fn bulk_add(&self, table: &str, records: Vec<Value>) -> StorageResult<Vec<String>> {
        let records = records
            .into_iter()
            .map(|r| self.maybe_encrypt(table, r))
            .collect::<StorageResult<Vec<_>>>()?;
        self.backend.bulk_add(table, records).await
    }

    async fn bulk_delete(&self, table: &str, keys: &[String]) -> StorageResult<()> {
        self.backend.bulk_delete(table, keys).await
    }

    async fn apply_transaction(&self, ops: Vec<TxOp>) -> StorageResult<()> {
        let ops = ops
            .into_iter()
            .map(|op| match op {
                TxOp::Put { table, record } => {
                    let record = self.maybe_encrypt(&table, record)?;
                    Ok(TxOp::Put { table, record })
                }
                other => Ok(other),
            })
            .collect::<StorageResult<Vec<_>>>()?;
        self.backend.apply_transaction(ops).await
    }

    async fn count(&self, table: &str, filter: Option<&RecordFilter>) -> StorageResult<usize> {
        self.backend.count(table, filter).await
    }

    async fn clear_table(&self, table: &str) -> StorageResult<()> {
        self.backend.clear_table(table).await
    }

    async fn clear_all(&self) -> StorageResult<()> {
        self.backend.clear_all().await
    }

    async fn get_usage(&self) -> StorageResult<StorageUsage> {
        self.backend.get_usage().await
    }

    fn generate_id(&self) -> String {
        self.backend.generate_id()
    }

    fn table_names(&self) -> Vec<String> {
        self.backend.table_names()
    }
}
