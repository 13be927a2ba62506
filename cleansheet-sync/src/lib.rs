//! Multi-device sync for Cleansheet.
//!
//! Layers over `cleansheet-storage`: a remote [`ObjectStore`] contract with
//! an HTTP implementation, the [`SyncEngine`] (upload/download with
//! last-writer-wins conflict resolution and an auto-sync loop), the
//! one-time anonymous-profile merge, and [`HybridStore`] for small values
//! that want remote-first reads with debounced writes.

pub mod engine;
pub mod error;
pub mod hybrid;
pub mod merge;
pub mod remote;

pub use engine::{create_sync_engine, SyncConfig, SyncEngine, SyncHandle, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use hybrid::HybridStore;
pub use merge::merge_workspaces;
pub use remote::{HttpObjectStore, MemoryObjectStore, ObjectStore, RemoteObject};
