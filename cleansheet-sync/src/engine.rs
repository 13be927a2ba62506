//! Sync engine — upload, download, conflict resolution and the auto-sync
//! loop.
//!
//! The local store is the system of record; the remote holds one snapshot
//! of the workspace per persona, one JSON blob per collection plus a
//! metadata record. Metadata is always written last, so a reader that sees
//! it sees a complete snapshot. Conflicts resolve at session level by
//! last-writer-wins on the recorded timestamps.

use crate::error::{SyncError, SyncResult};
use crate::merge::{item_stamp, merge_workspaces};
use crate::remote::ObjectStore;
use chrono::{DateTime, Utc};
use cleansheet_storage::{ImportMode, StorageService};
use cleansheet_types::{
    DeviceId, PersonaId, SyncDirection, SyncEvent, SyncMetadata, Workspace, ENTITY_COLLECTIONS,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Settings key recording the remote version this device last wrote or
/// applied, together with the matching sync time. One record keeps the
/// two values from ever diverging across a crash.
const SETTING_SYNC_STATE: &str = "sync_state";

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Auto-sync timer period.
    pub auto_sync_interval: Duration,
    /// Debounce window for hybrid remote writes.
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_interval: Duration::from_secs(60),
            debounce: Duration::from_secs(2),
        }
    }
}

/// What a sync call accomplished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed { version: i64 },
    /// Remote was not newer than local state.
    UpToDate,
    /// Another sync was already running; this call did nothing.
    Skipped,
}

/// Commands accepted by the running engine loop.
#[derive(Debug)]
enum SyncCommand {
    SyncNow,
    SetForeground(bool),
    Stop,
}

/// Handle for controlling a running sync engine.
#[derive(Clone)]
pub struct SyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    /// Triggers a full sync cycle immediately.
    pub async fn sync_now(&self) -> SyncResult<()> {
        self.command_tx
            .send(SyncCommand::SyncNow)
            .await
            .map_err(|_| SyncError::NotRunning)
    }

    /// Foreground transitions gate the auto-sync timer; coming back to the
    /// foreground also triggers a download to catch up.
    pub async fn set_foreground(&self, foreground: bool) -> SyncResult<()> {
        self.command_tx
            .send(SyncCommand::SetForeground(foreground))
            .await
            .map_err(|_| SyncError::NotRunning)
    }

    /// Stops the loop after a best-effort final upload.
    pub async fn stop(&self) -> SyncResult<()> {
        self.command_tx
            .send(SyncCommand::Stop)
            .await
            .map_err(|_| SyncError::NotRunning)
    }
}

/// Multi-device sync engine for one persona.
pub struct SyncEngine {
    storage: Arc<StorageService>,
    remote: Arc<dyn ObjectStore>,
    persona: PersonaId,
    device_id: DeviceId,
    config: SyncConfig,
    /// Guards `sync_up` against `sync_down`; a second caller gets a no-op,
    /// never queued work.
    in_progress: AtomicBool,
    foreground: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
    command_rx: mpsc::Receiver<SyncCommand>,
}

/// Creates a sync engine and its command handle.
pub fn create_sync_engine(
    storage: Arc<StorageService>,
    remote: Arc<dyn ObjectStore>,
    persona: PersonaId,
    device_id: DeviceId,
    config: SyncConfig,
) -> (SyncHandle, SyncEngine) {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (events, _) = broadcast::channel(64);

    let handle = SyncHandle { command_tx };
    let engine = SyncEngine {
        storage,
        remote,
        persona,
        device_id,
        config,
        in_progress: AtomicBool::new(false),
        foreground: AtomicBool::new(true),
        events,
        command_rx,
    };
    (handle, engine)
}

impl SyncEngine {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    fn collection_path(&self, persona: &PersonaId, name: &str) -> String {
        format!("{persona}/workspace/{name}.json")
    }

    fn metadata_path(&self, persona: &PersonaId) -> String {
        format!("{persona}/workspace/sync-metadata.json")
    }

    /// Uploads the workspace. Returns [`SyncOutcome::Skipped`] when a sync
    /// is already running.
    pub async fn sync_up(&self) -> SyncResult<SyncOutcome> {
        if !self.try_begin() {
            return Ok(SyncOutcome::Skipped);
        }
        self.emit(SyncEvent::SyncStart {
            direction: SyncDirection::Up,
        });
        let result = self.do_sync_up().await;
        self.end();

        match result {
            Ok(version) => {
                self.emit(SyncEvent::SyncComplete {
                    direction: SyncDirection::Up,
                    version: Some(version),
                    up_to_date: false,
                });
                Ok(SyncOutcome::Completed { version })
            }
            Err(e) => {
                self.emit(SyncEvent::SyncError {
                    direction: SyncDirection::Up,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Downloads remote state and reconciles it with local changes.
    pub async fn sync_down(&self) -> SyncResult<SyncOutcome> {
        if !self.try_begin() {
            return Ok(SyncOutcome::Skipped);
        }
        self.emit(SyncEvent::SyncStart {
            direction: SyncDirection::Down,
        });
        let result = self.do_sync_down().await;
        self.end();

        match result {
            Ok(outcome) => {
                self.emit(SyncEvent::SyncComplete {
                    direction: SyncDirection::Down,
                    version: match outcome {
                        SyncOutcome::Completed { version } => Some(version),
                        _ => None,
                    },
                    up_to_date: outcome == SyncOutcome::UpToDate,
                });
                Ok(outcome)
            }
            Err(e) => {
                self.emit(SyncEvent::SyncError {
                    direction: SyncDirection::Down,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn try_begin(&self) -> bool {
        let begun = self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !begun {
            debug!("sync already in progress, skipping");
        }
        begun
    }

    fn end(&self) {
        self.in_progress.store(false, Ordering::Release);
    }

    async fn do_sync_up(&self) -> SyncResult<i64> {
        let workspace = self.storage.export_all(&self.persona).await?;
        let total_size = serde_json::to_string(&workspace)?.len();

        let mut names = Vec::new();
        if let Some(profile) = &workspace.profile {
            self.remote
                .put(&self.collection_path(&self.persona, "profile"), profile)
                .await?;
            names.push("profile".to_string());
        }
        for name in ENTITY_COLLECTIONS {
            if let Some(items) = workspace.collection(name) {
                self.remote
                    .put(
                        &self.collection_path(&self.persona, name),
                        &Value::Array(items.clone()),
                    )
                    .await?;
                names.push(name.to_string());
            }
        }

        // Metadata last: a half-finished upload is invisible to readers.
        let metadata = SyncMetadata::new(self.device_id.clone(), names, total_size);
        self.remote
            .put(
                &self.metadata_path(&self.persona),
                &serde_json::to_value(&metadata)?,
            )
            .await?;

        self.record_synced(&metadata).await?;
        info!(
            "sync up complete for {} (version {})",
            self.persona, metadata.version
        );
        Ok(metadata.version)
    }

    async fn do_sync_down(&self) -> SyncResult<SyncOutcome> {
        let Some(meta_value) = self.remote.get(&self.metadata_path(&self.persona)).await? else {
            // Nothing remote yet: this device seeds the snapshot.
            info!("no remote snapshot for {}, bootstrapping upload", self.persona);
            let version = self.do_sync_up().await?;
            return Ok(SyncOutcome::Completed { version });
        };
        let metadata: SyncMetadata = serde_json::from_value(meta_value)
            .map_err(|e| SyncError::MalformedRemote(e.to_string()))?;

        let local_version = self.recorded_version().await?;
        if !metadata.is_newer_than(local_version) {
            debug!("remote version {} not newer, up to date", metadata.version);
            return Ok(SyncOutcome::UpToDate);
        }

        let remote_workspace = self
            .download_workspace(&self.persona, &metadata.collections)
            .await?;

        if self.has_local_changes().await? {
            // Both sides moved since this device last synced. Last writer
            // wins at session granularity.
            let local_latest = self.latest_local_modification().await?;
            let remote_wins = local_latest.is_none_or(|local| metadata.last_sync_up > local);
            if !remote_wins {
                info!("local changes newer than remote snapshot, re-uploading");
                let version = self.do_sync_up().await?;
                return Ok(SyncOutcome::Completed { version });
            }
        }

        self.storage
            .import_all(&remote_workspace, &self.persona, ImportMode::Overwrite)
            .await?;
        self.record_applied(&metadata).await?;
        info!(
            "sync down complete for {} (version {})",
            self.persona, metadata.version
        );
        Ok(SyncOutcome::Completed {
            version: metadata.version,
        })
    }

    async fn download_workspace(
        &self,
        persona: &PersonaId,
        collections: &[String],
    ) -> SyncResult<Workspace> {
        let mut workspace = Workspace::empty(persona.clone());
        for name in collections {
            let Some(blob) = self
                .remote
                .get(&self.collection_path(persona, name))
                .await?
            else {
                warn!("collection blob '{name}' named in metadata but missing");
                continue;
            };
            if name == "profile" {
                workspace.profile = Some(blob);
            } else if let Some(target) = workspace.collection_mut(name) {
                match blob {
                    Value::Array(items) => *target = items,
                    other => {
                        return Err(SyncError::MalformedRemote(format!(
                            "collection '{name}' is not an array: {other}"
                        )));
                    }
                }
            }
        }
        Ok(workspace)
    }

    /// True when local data changed after this device's last sync, or the
    /// device never synced at all.
    pub async fn has_local_changes(&self) -> SyncResult<bool> {
        let Some(last_sync) = self.recorded_sync_time().await? else {
            return Ok(true);
        };
        Ok(self
            .latest_local_modification()
            .await?
            .is_some_and(|latest| latest > last_sync))
    }

    /// Newest modification stamp across the persona's records.
    async fn latest_local_modification(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let workspace = self.storage.export_all(&self.persona).await?;
        let mut latest = workspace.profile.as_ref().and_then(item_stamp);
        for name in ENTITY_COLLECTIONS {
            if let Some(items) = workspace.collection(name) {
                for item in items {
                    let stamp = item_stamp(item);
                    if stamp > latest {
                        latest = stamp;
                    }
                }
            }
        }
        Ok(latest)
    }

    async fn recorded_version(&self) -> SyncResult<i64> {
        Ok(self
            .storage
            .get_setting(SETTING_SYNC_STATE)
            .await?
            .and_then(|v| v.get("version").and_then(Value::as_i64))
            .unwrap_or(0))
    }

    async fn recorded_sync_time(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self
            .storage
            .get_setting(SETTING_SYNC_STATE)
            .await?
            .and_then(|v| v.get("lastSyncUp").and_then(Value::as_str).map(str::to_string))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }

    async fn record_synced(&self, metadata: &SyncMetadata) -> SyncResult<()> {
        self.storage
            .save_setting(
                SETTING_SYNC_STATE,
                json!({
                    "version": metadata.version,
                    "lastSyncUp": metadata.last_sync_up.to_rfc3339(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn record_applied(&self, metadata: &SyncMetadata) -> SyncResult<()> {
        // Applying a remote snapshot counts as being in sync with it.
        self.record_synced(metadata).await
    }

    // ── Anonymous-profile migration ──────────────────────────────

    /// One-time adoption of data created before sign-in. Merges the
    /// anonymous remote workspace into the local one (see [`crate::merge`])
    /// and uploads the result. Idempotent via a settings marker.
    pub async fn migrate_anonymous_profile(&self, anonymous: &PersonaId) -> SyncResult<usize> {
        let marker_key = format!("anonymous_migration_{anonymous}");
        if let Some(marker) = self.storage.get_setting(&marker_key).await? {
            if marker.get("completed").and_then(Value::as_bool) == Some(true) {
                debug!("anonymous migration for {anonymous} already done");
                return Ok(0);
            }
        }

        self.emit(SyncEvent::MigrationStart);
        match self.do_migrate(anonymous).await {
            Ok(merged) => {
                self.storage
                    .save_setting(
                        &marker_key,
                        json!({"completed": true, "date": Utc::now().to_rfc3339(), "merged": merged}),
                    )
                    .await?;
                self.emit(SyncEvent::MigrationComplete { merged });
                Ok(merged)
            }
            Err(e) => {
                self.emit(SyncEvent::MigrationError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn do_migrate(&self, anonymous: &PersonaId) -> SyncResult<usize> {
        let collections = match self.remote.get(&self.metadata_path(anonymous)).await? {
            Some(meta_value) => {
                let metadata: SyncMetadata = serde_json::from_value(meta_value)
                    .map_err(|e| SyncError::MalformedRemote(e.to_string()))?;
                metadata.collections
            }
            None => {
                // No metadata: fall back to whatever blobs exist.
                let prefix = format!("{anonymous}/workspace/");
                let objects = self.remote.list(&prefix).await?;
                if objects.is_empty() {
                    info!("no anonymous data for {anonymous}, nothing to migrate");
                    return Ok(0);
                }
                objects
                    .into_iter()
                    .filter_map(|o| {
                        o.name
                            .strip_prefix(&prefix)
                            .and_then(|n| n.strip_suffix(".json"))
                            .map(str::to_string)
                    })
                    .collect()
            }
        };

        let remote_workspace = self.download_workspace(anonymous, &collections).await?;
        let local = self.storage.export_all(&self.persona).await?;
        let (merged, taken) = merge_workspaces(&local, &remote_workspace);

        self.storage
            .import_all(&merged, &self.persona, ImportMode::Overwrite)
            .await?;
        info!("anonymous migration merged {taken} items from {anonymous}");

        self.sync_up().await?;
        Ok(taken)
    }

    // ── Engine loop ──────────────────────────────────────────────

    /// Runs the auto-sync loop until stopped. Timer ticks upload only when
    /// local changes are pending and the app is foregrounded; remote
    /// failures on this path are logged and dropped.
    pub async fn run(&mut self) {
        info!("sync engine started for persona {}", self.persona);

        let mut ticker = tokio::time::interval(self.config.auto_sync_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.foreground.load(Ordering::Acquire) {
                        continue;
                    }
                    match self.has_local_changes().await {
                        Ok(true) => {
                            if let Err(e) = self.sync_up().await {
                                warn!("auto sync failed: {e}");
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!("change check failed: {e}"),
                    }
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(SyncCommand::SyncNow) => {
                        if let Err(e) = self.sync_down().await {
                            warn!("manual sync failed: {e}");
                        }
                    }
                    Some(SyncCommand::SetForeground(foreground)) => {
                        let was = self.foreground.swap(foreground, Ordering::AcqRel);
                        if foreground && !was {
                            if let Err(e) = self.sync_down().await {
                                warn!("foreground catch-up sync failed: {e}");
                            }
                        }
                    }
                    Some(SyncCommand::Stop) | None => {
                        if let Ok(true) = self.has_local_changes().await {
                            if let Err(e) = self.sync_up().await {
                                warn!("final sync failed: {e}");
                            }
                        }
                        break;
                    }
                }
            }
        }

        info!("sync engine stopped");
    }
}
