//! Remote sync metadata.

use crate::ids::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Small record written alongside the remote copy of a workspace, always
/// uploaded **after** every collection blob so readers only ever observe a
/// complete snapshot.
///
/// The numeric `version` is the single source of truth for freshness: local
/// state compares against it numerically, never by wall clock alone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Monotonic, time-based version stamp (milliseconds since epoch at the
    /// uploading device).
    pub version: i64,
    /// When the uploading device completed its last sync-up.
    pub last_sync_up: DateTime<Utc>,
    /// Same instant as `last_sync_up`, in epoch milliseconds.
    pub last_sync_up_timestamp: i64,
    pub device_id: DeviceId,
    /// Names of the collection blobs that exist remotely.
    pub collections: Vec<String>,
    /// Serialized size of the uploaded workspace, in bytes.
    pub total_size: usize,
    /// Identity of the workspace owner, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl SyncMetadata {
    pub fn new(device_id: DeviceId, collections: Vec<String>, total_size: usize) -> Self {
        let now = Utc::now();
        Self {
            version: now.timestamp_millis(),
            last_sync_up: now,
            last_sync_up_timestamp: now.timestamp_millis(),
            device_id,
            collections,
            total_size,
            owner: None,
        }
    }

    /// True if this remote metadata is strictly newer than a locally
    /// recorded version counter.
    pub fn is_newer_than(&self, local_version: i64) -> bool {
        self.version > local_version
    }
}
