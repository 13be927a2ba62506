//! Shared fixtures for the sync test suites.
#![allow(dead_code)]

use cleansheet_crypto::{DeviceCrypto, DeviceSecret};
use cleansheet_storage::{MemoryBackend, StorageService};
use cleansheet_sync::{create_sync_engine, MemoryObjectStore, SyncConfig, SyncEngine, SyncHandle};
use cleansheet_types::{DeviceId, PersonaId};
use std::sync::Arc;
use std::time::Duration;

pub async fn storage() -> Arc<StorageService> {
    let svc = StorageService::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(DeviceCrypto::new(DeviceSecret::generate())),
    );
    svc.initialize().await.unwrap();
    Arc::new(svc)
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        auto_sync_interval: Duration::from_millis(40),
        debounce: Duration::from_millis(30),
    }
}

/// An engine for one device, wired to shared remote storage.
pub async fn device(
    remote: Arc<MemoryObjectStore>,
    persona: &str,
) -> (Arc<StorageService>, SyncHandle, SyncEngine) {
    let storage = storage().await;
    let (handle, engine) = create_sync_engine(
        storage.clone(),
        remote,
        PersonaId::new(persona),
        DeviceId::generate(),
        test_config(),
    );
    (storage, handle, engine)
}
