//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the storage stack.
///
/// Per-field encrypt/decrypt failures are deliberately *not* variants here:
/// the middleware logs them and degrades the affected field (plaintext kept
/// on encrypt failure, null on decrypt failure) instead of failing the
/// whole operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage service not initialized")]
    NotInitialized,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("duplicate key {key} in table {table}")]
    DuplicateKey { table: String, key: String },

    #[error("{table} entity {id} not found")]
    EntityNotFound { table: String, id: String },

    /// The encrypt/decrypt probe at initialize did not round-trip. The
    /// store refuses to run rather than silently persisting plaintext.
    #[error("encryption self-test failed — refusing to run unencrypted")]
    EncryptionSelfTest,

    #[error("backup password incorrect")]
    BackupPasswordIncorrect,

    /// The keys payload is present but names no providers or carries no
    /// data. Distinct from a wrong password: there is nothing to restore.
    #[error("backup contains no API keys")]
    BackupNoKeysFound,

    #[error("backup file corrupted: {0}")]
    BackupCorrupted(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] cleansheet_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
