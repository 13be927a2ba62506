//! Unified storage service.
//!
//! The single entry point feature code uses: persona-scoped CRUD per entity
//! type, whole-workspace export/import, encrypted backup/restore and the
//! one-time legacy migration. Composes the encryption middleware over the
//! injected backend; settings bypass the middleware entirely.

use crate::backend::{RecordFilter, RecordStore, StorageUsage, TxOp};
use crate::encrypted::EncryptedStore;
use crate::error::{StorageError, StorageResult};
use crate::legacy::LegacyStore;
use chrono::Utc;
use cleansheet_crypto::{CryptoError, CryptoProvider};
use cleansheet_types::{
    ApiKeysBackup, BackupEnvelope, PersonaId, Provider, ProviderKey, Workspace,
    ENTITY_COLLECTIONS,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Settings key marking the legacy migration as done.
const MIGRATION_MARKER: &str = "migration_from_localstorage";

/// Settings key prefix for device-encrypted provider API keys.
const API_KEY_PREFIX: &str = "api_key_";

/// How `import_all` treats existing rows for the target persona.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMode {
    /// Upsert imported records over whatever is present.
    Merge,
    /// Remove the persona's existing rows first (full-overwrite restore —
    /// the only path that deletes entities on a caller's behalf).
    Overwrite,
}

/// Outcome of the legacy migration. A failed key is recorded and skipped;
/// the remaining keys still migrate.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MigrationReport {
    pub migrated: BTreeMap<String, usize>,
    pub failed_keys: Vec<String>,
    pub already_completed: bool,
}

impl MigrationReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_keys.is_empty()
    }
}

/// High-level storage API over the encrypted middleware.
pub struct StorageService {
    storage: Arc<EncryptedStore>,
    crypto: Arc<dyn CryptoProvider>,
    initialized: AtomicBool,
}

impl StorageService {
    pub fn new(backend: Arc<dyn RecordStore>, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            storage: Arc::new(EncryptedStore::new(backend, crypto.clone())),
            crypto,
            initialized: AtomicBool::new(false),
        }
    }

    pub async fn initialize(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.storage.initialize().await?;
        self.initialized.store(true, Ordering::Release);
        info!("storage service initialized");
        Ok(())
    }

    pub async fn close(&self) -> StorageResult<()> {
        self.initialized.store(false, Ordering::Release);
        self.storage.close().await
    }

    /// The encryption middleware, for callers composing on top of it.
    pub fn store(&self) -> &Arc<EncryptedStore> {
        &self.storage
    }

    pub fn generate_id(&self) -> String {
        self.storage.generate_id()
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    // ── Generic entity CRUD ──────────────────────────────────────

    async fn list_entities(
        &self,
        table: &str,
        persona_id: &PersonaId,
    ) -> StorageResult<Vec<Value>> {
        self.ensure_initialized()?;
        self.storage
            .get_all(table, Some(&RecordFilter::persona(persona_id)))
            .await
    }

    async fn get_entity(&self, table: &str, id: &str) -> StorageResult<Option<Value>> {
        self.ensure_initialized()?;
        self.storage.get(table, id).await
    }

    /// Stamps identity, persona and timestamps, then inserts.
    async fn add_entity(
        &self,
        table: &str,
        persona_id: &PersonaId,
        entity: Value,
    ) -> StorageResult<String> {
        self.ensure_initialized()?;
        let record = self.stamp(entity, persona_id, true)?;
        self.storage.add(table, record).await
    }

    /// Merges a patch over the existing record. Identity and persona are
    /// immutable; a missing id is an error (unlike delete).
    async fn update_entity(&self, table: &str, id: &str, patch: Value) -> StorageResult<()> {
        self.ensure_initialized()?;
        let existing = self.storage.get(table, id).await?.ok_or_else(|| {
            StorageError::EntityNotFound {
                table: table.to_string(),
                id: id.to_string(),
            }
        })?;

        let Value::Object(mut fields) = existing else {
            return Err(StorageError::InvalidRecord(
                "stored entity is not an object".to_string(),
            ));
        };
        let Value::Object(patch) = patch else {
            return Err(StorageError::InvalidRecord(
                "update patch is not an object".to_string(),
            ));
        };

        for (name, value) in patch {
            if name == "id" || name == "personaId" {
                continue;
            }
            fields.insert(name, value);
        }
        fields.insert("lastModified".to_string(), json!(Utc::now().to_rfc3339()));

        self.storage.put(table, Value::Object(fields)).await?;
        Ok(())
    }

    /// Idempotent: deleting an id that never existed is not an error.
    async fn delete_entity(&self, table: &str, id: &str) -> StorageResult<()> {
        self.ensure_initialized()?;
        self.storage.delete(table, id).await
    }

    /// Upsert used by document-style entities: add when there is no id,
    /// replace otherwise.
    async fn save_entity(
        &self,
        table: &str,
        persona_id: &PersonaId,
        entity: Value,
    ) -> StorageResult<String> {
        self.ensure_initialized()?;
        let has_id = entity.get("id").and_then(Value::as_str).is_some();
        let record = self.stamp(entity, persona_id, !has_id)?;
        if has_id {
            self.storage.put(table, record).await
        } else {
            self.storage.add(table, record).await
        }
    }

    fn stamp(
        &self,
        entity: Value,
        persona_id: &PersonaId,
        assign_id: bool,
    ) -> StorageResult<Value> {
        let Value::Object(mut fields) = entity else {
            return Err(StorageError::InvalidRecord(
                "entity is not an object".to_string(),
            ));
        };
        if assign_id && fields.get("id").and_then(Value::as_str).is_none() {
            fields.insert("id".to_string(), json!(self.storage.generate_id()));
        }
        fields.insert("personaId".to_string(), json!(persona_id.as_str()));
        let now = Utc::now().to_rfc3339();
        fields
            .entry("created".to_string())
            .or_insert_with(|| json!(now.clone()));
        fields.insert("lastModified".to_string(), json!(now));
        Ok(Value::Object(fields))
    }

    // ── Per-entity wrappers ──────────────────────────────────────

    pub async fn get_experiences(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("experiences", persona).await
    }

    pub async fn get_experience(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("experiences", id).await
    }

    pub async fn add_experience(
        &self,
        persona: &PersonaId,
        experience: Value,
    ) -> StorageResult<String> {
        self.add_entity("experiences", persona, experience).await
    }

    pub async fn update_experience(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("experiences", id, patch).await
    }

    pub async fn delete_experience(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("experiences", id).await
    }

    pub async fn get_stories(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("stories", persona).await
    }

    pub async fn get_story(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("stories", id).await
    }

    pub async fn add_story(&self, persona: &PersonaId, story: Value) -> StorageResult<String> {
        self.add_entity("stories", persona, story).await
    }

    pub async fn update_story(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("stories", id, patch).await
    }

    pub async fn delete_story(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("stories", id).await
    }

    pub async fn get_jobs(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("jobs", persona).await
    }

    pub async fn get_job(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("jobs", id).await
    }

    pub async fn add_job(&self, persona: &PersonaId, job: Value) -> StorageResult<String> {
        self.add_entity("jobs", persona, job).await
    }

    pub async fn update_job(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("jobs", id, patch).await
    }

    pub async fn delete_job(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("jobs", id).await
    }

    pub async fn get_goals(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("goals", persona).await
    }

    pub async fn get_goal(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("goals", id).await
    }

    pub async fn add_goal(&self, persona: &PersonaId, goal: Value) -> StorageResult<String> {
        self.add_entity("goals", persona, goal).await
    }

    pub async fn update_goal(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("goals", id, patch).await
    }

    pub async fn delete_goal(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("goals", id).await
    }

    pub async fn get_portfolio(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("portfolio", persona).await
    }

    pub async fn get_portfolio_item(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("portfolio", id).await
    }

    pub async fn add_portfolio_item(
        &self,
        persona: &PersonaId,
        item: Value,
    ) -> StorageResult<String> {
        self.add_entity("portfolio", persona, item).await
    }

    pub async fn update_portfolio_item(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("portfolio", id, patch).await
    }

    pub async fn delete_portfolio_item(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("portfolio", id).await
    }

    pub async fn get_documents(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("documents", persona).await
    }

    pub async fn get_document(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("documents", id).await
    }

    pub async fn add_document(&self, persona: &PersonaId, doc: Value) -> StorageResult<String> {
        self.add_entity("documents", persona, doc).await
    }

    pub async fn save_document(&self, persona: &PersonaId, doc: Value) -> StorageResult<String> {
        self.save_entity("documents", persona, doc).await
    }

    pub async fn update_document(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("documents", id, patch).await
    }

    pub async fn delete_document(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("documents", id).await
    }

    pub async fn get_diagrams(&self, persona: &PersonaId) -> StorageResult<Vec<Value>> {
        self.list_entities("diagrams", persona).await
    }

    pub async fn get_diagram(&self, id: &str) -> StorageResult<Option<Value>> {
        self.get_entity("diagrams", id).await
    }

    pub async fn add_diagram(&self, persona: &PersonaId, diagram: Value) -> StorageResult<String> {
        self.add_entity("diagrams", persona, diagram).await
    }

    pub async fn save_diagram(&self, persona: &PersonaId, diagram: Value) -> StorageResult<String> {
        self.save_entity("diagrams", persona, diagram).await
    }

    pub async fn update_diagram(&self, id: &str, patch: Value) -> StorageResult<()> {
        self.update_entity("diagrams", id, patch).await
    }

    pub async fn delete_diagram(&self, id: &str) -> StorageResult<()> {
        self.delete_entity("diagrams", id).await
    }

    // ── Profile (singleton per persona) ──────────────────────────

    pub async fn get_profile(&self, persona: &PersonaId) -> StorageResult<Option<Value>> {
        self.ensure_initialized()?;
        self.storage.get("profiles", persona.as_str()).await
    }

    pub async fn save_profile(&self, persona: &PersonaId, profile: Value) -> StorageResult<()> {
        self.ensure_initialized()?;
        let Value::Object(mut fields) = profile else {
            return Err(StorageError::InvalidRecord(
                "profile is not an object".to_string(),
            ));
        };
        fields.insert("id".to_string(), json!(persona.as_str()));
        fields.insert("personaId".to_string(), json!(persona.as_str()));
        fields.insert("lastModified".to_string(), json!(Utc::now().to_rfc3339()));
        self.storage.put("profiles", Value::Object(fields)).await?;
        Ok(())
    }

    // ── Settings (never encrypted) ───────────────────────────────

    /// Settings hold operational flags, not personal content, and bypass
    /// the encryption middleware entirely.
    pub async fn get_setting(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_initialized()?;
        let record = self.storage.backend().get("settings", key).await?;
        Ok(record.and_then(|mut r| {
            r.as_object_mut().and_then(|o| o.remove("value"))
        }))
    }

    pub async fn save_setting(&self, key: &str, value: Value) -> StorageResult<()> {
        self.ensure_initialized()?;
        self.storage
            .backend()
            .put(
                "settings",
                json!({
                    "id": key,
                    "value": value,
                    "encrypted": false,
                    "lastModified": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(())
    }

    // ── Provider API keys (device-encrypted, stored in settings) ─

    pub async fn save_api_key(
        &self,
        provider: Provider,
        api_key: &str,
        model: Option<String>,
    ) -> StorageResult<()> {
        let token = self.crypto.encrypt(api_key)?;
        self.save_setting(
            &format!("{API_KEY_PREFIX}{provider}"),
            json!({ "apiKey": token, "model": model }),
        )
        .await
    }

    /// Returns the decrypted key and the stored model name.
    pub async fn get_api_key(
        &self,
        provider: Provider,
    ) -> StorageResult<Option<(String, Option<String>)>> {
        let Some(value) = self.get_setting(&format!("{API_KEY_PREFIX}{provider}")).await? else {
            return Ok(None);
        };
        let Some(token) = value.get("apiKey").and_then(Value::as_str) else {
            return Ok(None);
        };
        let plaintext = self.crypto.decrypt(token)?;
        let model = value
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Some((plaintext, model)))
    }

    pub async fn list_api_key_providers(&self) -> StorageResult<Vec<Provider>> {
        self.ensure_initialized()?;
        let records = self.storage.backend().get_all("settings", None).await?;
        let mut providers = Vec::new();
        for record in records {
            if let Some(id) = record.get("id").and_then(Value::as_str) {
                if let Some(name) = id.strip_prefix(API_KEY_PREFIX) {
                    if let Ok(provider) = name.parse::<Provider>() {
                        providers.push(provider);
                    }
                }
            }
        }
        providers.sort();
        Ok(providers)
    }

    pub async fn get_active_provider(&self) -> StorageResult<Option<Provider>> {
        Ok(self
            .get_setting("active_provider")
            .await?
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok())))
    }

    pub async fn set_active_provider(&self, provider: Provider) -> StorageResult<()> {
        self.save_setting("active_provider", json!(provider.as_str()))
            .await
    }

    // ── Export / import ──────────────────────────────────────────

    /// Collects every entity type for the persona into one workspace.
    pub async fn export_all(&self, persona: &PersonaId) -> StorageResult<Workspace> {
        self.ensure_initialized()?;

        let (profile, experiences, stories, jobs, goals, portfolio, documents, diagrams) =
            tokio::try_join!(
                self.get_profile(persona),
                self.get_experiences(persona),
                self.get_stories(persona),
                self.get_jobs(persona),
                self.get_goals(persona),
                self.get_portfolio(persona),
                self.get_documents(persona),
                self.get_diagrams(persona),
            )?;

        let mut workspace = Workspace::empty(persona.clone());
        workspace.profile = profile;
        workspace.experiences = experiences;
        workspace.stories = stories;
        workspace.jobs = jobs;
        workspace.goals = goals;
        workspace.portfolio = portfolio;
        workspace.documents = documents;
        workspace.diagrams = diagrams;
        Ok(workspace)
    }

    /// Applies every collection of the workspace in a single backend
    /// transaction: either all collections land or none do.
    pub async fn import_all(
        &self,
        workspace: &Workspace,
        persona: &PersonaId,
        mode: ImportMode,
    ) -> StorageResult<()> {
        self.ensure_initialized()?;
        let mut ops: Vec<TxOp> = Vec::new();

        if mode == ImportMode::Overwrite {
            ops.push(TxOp::Delete {
                table: "profiles".to_string(),
                key: persona.as_str().to_string(),
            });
            for table in ENTITY_COLLECTIONS {
                let existing = self
                    .storage
                    .backend()
                    .get_all(table, Some(&RecordFilter::persona(persona)))
                    .await?;
                for record in existing {
                    if let Some(id) = record.get("id").and_then(Value::as_str) {
                        ops.push(TxOp::Delete {
                            table: table.to_string(),
                            key: id.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(profile) = &workspace.profile {
            let mut fields = profile
                .as_object()
                .cloned()
                .unwrap_or_else(Map::new);
            fields.insert("id".to_string(), json!(persona.as_str()));
            fields.insert("personaId".to_string(), json!(persona.as_str()));
            ops.push(TxOp::Put {
                table: "profiles".to_string(),
                record: Value::Object(fields),
            });
        }

        for table in ENTITY_COLLECTIONS {
            let Some(items) = workspace.collection(table) else { continue };
            for item in items {
                let record = self.stamp_imported(item.clone(), persona)?;
                ops.push(TxOp::Put {
                    table: table.to_string(),
                    record,
                });
            }
        }

        self.storage.apply_transaction(ops).await?;
        info!("import complete for persona {persona}");
        Ok(())
    }

    /// Re-stamps persona and guarantees an id without touching timestamps
    /// (imported items keep their own modification history).
    fn stamp_imported(&self, item: Value, persona: &PersonaId) -> StorageResult<Value> {
        let Value::Object(mut fields) = item else {
            return Err(StorageError::InvalidRecord(
                "imported item is not an object".to_string(),
            ));
        };
        if fields.get("id").and_then(Value::as_str).is_none() {
            fields.insert("id".to_string(), json!(self.storage.generate_id()));
        }
        fields.insert("personaId".to_string(), json!(persona.as_str()));
        Ok(Value::Object(fields))
    }

    /// Record counts per entity table for one persona.
    pub async fn counts(&self, persona: &PersonaId) -> StorageResult<BTreeMap<String, usize>> {
        self.ensure_initialized()?;
        let filter = RecordFilter::persona(persona);
        let mut counts = BTreeMap::new();
        for table in ENTITY_COLLECTIONS {
            counts.insert(
                table.to_string(),
                self.storage.count(table, Some(&filter)).await?,
            );
        }
        Ok(counts)
    }

    pub async fn get_usage(&self) -> StorageResult<StorageUsage> {
        self.ensure_initialized()?;
        self.storage.get_usage().await
    }

    // ── Encrypted backup / restore ───────────────────────────────

    /// Serializes the whole workspace and encrypts it as a single blob
    /// with the password — not field by field, so the backup reveals
    /// nothing about which fields exist, let alone their content.
    pub async fn create_encrypted_backup(
        &self,
        persona: &PersonaId,
        password: &str,
    ) -> StorageResult<BackupEnvelope> {
        let workspace = self.export_all(persona).await?;
        let serialized = serde_json::to_string(&workspace)?;
        let payload = self.crypto.encrypt_with_password(&serialized, password)?;
        Ok(BackupEnvelope::encrypted_workspace(payload))
    }

    /// Decrypts and imports a password-protected backup. Wrong password,
    /// corrupted file and empty payload each surface as their own error
    /// kind — the user's corrective action differs for each.
    pub async fn restore_encrypted_backup(
        &self,
        envelope: &BackupEnvelope,
        password: &str,
        persona: &PersonaId,
    ) -> StorageResult<Workspace> {
        if !envelope.encrypted {
            return Err(StorageError::BackupCorrupted(
                "backup is not encrypted".to_string(),
            ));
        }
        let payload = envelope.payload.as_deref().ok_or_else(|| {
            StorageError::BackupCorrupted("missing encrypted payload".to_string())
        })?;

        let serialized = self
            .crypto
            .decrypt_with_password(payload, password)
            .map_err(map_backup_crypto_error)?;
        let workspace: Workspace = serde_json::from_str(&serialized)
            .map_err(|e| StorageError::BackupCorrupted(e.to_string()))?;

        self.import_all(&workspace, persona, ImportMode::Merge).await?;
        Ok(workspace)
    }

    /// Plaintext workspace export with no key material field at all —
    /// suitable for sharing.
    pub async fn export_shareable(&self, persona: &PersonaId) -> StorageResult<BackupEnvelope> {
        let workspace = self.export_all(persona).await?;
        Ok(BackupEnvelope::shareable(workspace))
    }

    pub async fn restore_shareable(
        &self,
        envelope: &BackupEnvelope,
        persona: &PersonaId,
    ) -> StorageResult<()> {
        let workspace = envelope.data.as_ref().ok_or_else(|| {
            StorageError::BackupCorrupted("shareable backup has no data".to_string())
        })?;
        self.import_all(workspace, persona, ImportMode::Merge).await
    }

    // ── Keys-only backup / restore ───────────────────────────────

    /// Exports the stored provider keys, each re-encrypted under the
    /// password so the backup is portable across devices.
    pub async fn create_api_keys_backup(&self, password: &str) -> StorageResult<BackupEnvelope> {
        let providers = self.list_api_key_providers().await?;
        if providers.is_empty() {
            return Err(StorageError::BackupNoKeysFound);
        }

        let mut data = BTreeMap::new();
        for provider in &providers {
            if let Some((plaintext, model)) = self.get_api_key(*provider).await? {
                let token = self.crypto.encrypt_with_password(&plaintext, password)?;
                data.insert(*provider, ProviderKey { api_key: token, model });
            }
        }
        if data.is_empty() {
            return Err(StorageError::BackupNoKeysFound);
        }

        let keys = ApiKeysBackup {
            encrypted: true,
            providers,
            active_provider: self.get_active_provider().await?,
            data,
        };
        Ok(BackupEnvelope::api_keys_only(keys))
    }

    /// Restores a keys-only backup: decrypts each key with the password
    /// and re-encrypts it under this device's key. Never touches entity
    /// tables.
    pub async fn restore_api_keys_backup(
        &self,
        envelope: &BackupEnvelope,
        password: &str,
    ) -> StorageResult<Vec<Provider>> {
        let keys = envelope
            .api_keys_encrypted
            .as_ref()
            .ok_or(StorageError::BackupNoKeysFound)?;
        if !keys.has_keys() {
            return Err(StorageError::BackupNoKeysFound);
        }

        let mut restored = Vec::new();
        for (provider, key) in &keys.data {
            let plaintext = self
                .crypto
                .decrypt_with_password(&key.api_key, password)
                .map_err(map_backup_crypto_error)?;
            self.save_api_key(*provider, &plaintext, key.model.clone())
                .await?;
            restored.push(*provider);
        }
        if let Some(active) = keys.active_provider {
            self.set_active_provider(active).await?;
        }
        Ok(restored)
    }

    // ── Legacy migration ─────────────────────────────────────────

    /// One-time, idempotent copy of the known flat legacy keys into the
    /// structured store. Missing keys are skipped silently (absence is
    /// expected); a key that fails to parse is recorded and skipped while
    /// the rest still migrate.
    pub async fn migrate_from_legacy(
        &self,
        legacy: &dyn LegacyStore,
        persona: &PersonaId,
    ) -> StorageResult<MigrationReport> {
        self.ensure_initialized()?;

        if let Some(marker) = self.get_setting(MIGRATION_MARKER).await? {
            if marker.get("completed").and_then(Value::as_bool) == Some(true) {
                return Ok(MigrationReport {
                    already_completed: true,
                    ..MigrationReport::default()
                });
            }
        }

        let mut report = MigrationReport::default();

        if let Some(text) = legacy.get_item("userProfile") {
            match serde_json::from_str::<Value>(&text) {
                Ok(profile) => {
                    self.save_profile(persona, profile).await?;
                    report.migrated.insert("profiles".to_string(), 1);
                }
                Err(e) => {
                    warn!("legacy key 'userProfile' failed to parse, skipping: {e}");
                    report.failed_keys.push("userProfile".to_string());
                }
            }
        }

        let p = persona.as_str();
        let sources: [(&str, Vec<String>, &str); 7] = [
            (
                "experiences",
                vec!["user_experiences".into(), "cleansheet_experiences".into()],
                "mig_exp",
            ),
            ("stories", vec!["user_stories".into()], "mig_story"),
            ("jobs", vec!["user_jobs".into()], "mig_job"),
            ("goals", vec![format!("userGoals_{p}")], "mig_goal"),
            ("portfolio", vec![format!("userPortfolio_{p}")], "mig_port"),
            (
                "diagrams",
                vec![format!("diagrams_{p}"), format!("user_diagrams_{p}")],
                "mig_diag",
            ),
            (
                "documents",
                vec![
                    format!("interview_documents_{p}"),
                    format!("user_documents_{p}"),
                ],
                "mig_doc",
            ),
        ];

        for (table, keys, id_prefix) in sources {
            let Some((key, text)) = keys
                .iter()
                .find_map(|k| legacy.get_item(k).map(|v| (k.clone(), v)))
            else {
                continue;
            };

            match serde_json::from_str::<Vec<Value>>(&text) {
                Ok(items) => {
                    let count = items.len();
                    let records = items
                        .into_iter()
                        .enumerate()
                        .map(|(i, mut item)| {
                            if let Some(fields) = item.as_object_mut() {
                                if fields.get("id").and_then(Value::as_str).is_none() {
                                    fields.insert("id".to_string(), json!(format!("{id_prefix}_{i}")));
                                }
                                fields.insert("personaId".to_string(), json!(p));
                            }
                            item
                        })
                        .collect();
                    self.storage.bulk_put(table, records).await?;
                    report.migrated.insert(table.to_string(), count);
                }
                Err(e) => {
                    warn!("legacy key '{key}' failed to parse, skipping: {e}");
                    report.failed_keys.push(key);
                }
            }
        }

        self.save_setting(
            MIGRATION_MARKER,
            json!({
                "completed": true,
                "date": Utc::now().to_rfc3339(),
                "migrated": report.migrated.clone(),
                "failedKeys": report.failed_keys.clone(),
            }),
        )
        .await?;

        if report.is_partial() {
            warn!(
                "legacy migration partially complete, failed keys: {:?}",
                report.failed_keys
            );
        } else {
            info!("legacy migration complete: {:?}", report.migrated);
        }
        Ok(report)
    }
}

/// Maps a crypto failure during backup restore onto the user-facing error
/// kinds: AEAD failure means wrong password, parse failure means the file
/// is corrupted.
fn map_backup_crypto_error(e: CryptoError) -> StorageError {
    match e {
        CryptoError::WrongKey => StorageError::BackupPasswordIncorrect,
        CryptoError::Malformed(m) => StorageError::BackupCorrupted(m),
        other => StorageError::Crypto(other),
    }
}
