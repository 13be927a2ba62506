//! Encrypted local storage for Cleansheet.
//!
//! Three layers, composed bottom-up:
//!
//! - [`backend`]: the [`RecordStore`] contract every backend implements,
//!   plus the in-memory reference backend.
//! - [`encrypted`]: field-level encryption middleware wrapping any backend.
//!   Sensitive fields are encrypted transparently on write and decrypted on
//!   read; records carry a `_encrypted` marker listing which fields are
//!   ciphertext.
//! - [`service`]: the high-level [`StorageService`] feature code talks to —
//!   persona-scoped CRUD, export/import, backups and the legacy migration.

pub mod backend;
pub mod encrypted;
pub mod error;
pub mod legacy;
pub mod service;

pub use backend::{record_key, MemoryBackend, RecordFilter, RecordStore, StorageUsage, TxOp, TABLES};
pub use encrypted::{
    DecryptedValue, EncryptedRecord, EncryptedStore, DEFAULT_ENCRYPTED_FIELDS,
    DEFAULT_ENCRYPTED_TABLES, ENCRYPTED_MARKER,
};
pub use error::{StorageError, StorageResult};
pub use legacy::{LegacyStore, MemoryLegacyStore};
pub use service::{ImportMode, MigrationReport, StorageService};
