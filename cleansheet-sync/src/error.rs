//! Sync error types.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the sync stack.
///
/// The local store stays the system of record: on the timer path remote
/// failures are logged and dropped, and only explicit callers see
/// `RemoteUnavailable`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote storage unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote data malformed: {0}")]
    MalformedRemote(String),

    #[error("sync engine not running")]
    NotRunning,

    #[error(transparent)]
    Storage(#[from] cleansheet_storage::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
