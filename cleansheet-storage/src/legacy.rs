//! Legacy flat key-value store contract.
//!
//! Early versions kept everything as JSON strings under flat keys. The
//! one-time migration in the storage service reads through this trait;
//! production wires in the real flat store, tests use [`MemoryLegacyStore`].

use std::collections::HashMap;
use std::sync::RwLock;

/// Read-only view of the legacy flat key store.
pub trait LegacyStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
}

/// In-memory legacy store for tests and tooling.
#[derive(Default)]
pub struct MemoryLegacyStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_item(&self, key: impl Into<String>, value: impl Into<String>) {
        self.items.write().unwrap().insert(key.into(), value.into());
    }
}

impl LegacyStore for MemoryLegacyStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().unwrap().get(key).cloned()
    }
}
