//! Shared types for the Cleansheet core.
//!
//! Everything that crosses a crate boundary lives here: persona and device
//! identifiers, the `Workspace` export aggregate, remote sync metadata,
//! backup envelopes, the canonical `Provider` enum, and the typed sync
//! event set.

mod backup;
mod events;
mod ids;
mod sync;
mod workspace;

pub use backup::{
    backup_file_name, ApiKeysBackup, BackupEnvelope, BackupKind, Provider, ProviderKey,
    ProviderParseError, BACKUP_FORMAT_VERSION,
};
pub use events::{SyncDirection, SyncEvent};
pub use ids::{DeviceId, PersonaId};
pub use sync::SyncMetadata;
pub use workspace::{Workspace, ENTITY_COLLECTIONS};
