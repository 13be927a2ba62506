//! Export/import and the three backup flavors, end to end.

use cleansheet_crypto::{DeviceCrypto, DeviceSecret};
use cleansheet_storage::{ImportMode, MemoryBackend, RecordStore, StorageError, StorageService};
use cleansheet_types::{BackupEnvelope, BackupKind, PersonaId, Provider};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

async fn service() -> StorageService {
    let svc = StorageService::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(DeviceCrypto::new(DeviceSecret::generate())),
    );
    svc.initialize().await.unwrap();
    svc
}

fn persona(id: &str) -> PersonaId {
    PersonaId::new(id)
}

const PASSWORD: &str = "hunter2hunter2";

#[tokio::test]
async fn export_import_round_trips_a_workspace() {
    let source = service().await;
    let p = persona("p1");
    source.save_profile(&p, json!({"displayName": "Ada"})).await.unwrap();
    source
        .add_experience(&p, json!({"name": "Rewrite", "notes": "secret notes"}))
        .await
        .unwrap();
    source.add_story(&p, json!({"situation": "outage"})).await.unwrap();

    let workspace = source.export_all(&p).await.unwrap();
    assert_eq!(workspace.experiences.len(), 1);
    // Exported content is decrypted plaintext, ready for re-encryption
    // wherever it lands.
    assert_eq!(workspace.experiences[0]["notes"], "secret notes");

    let target = service().await;
    target.import_all(&workspace, &p, ImportMode::Merge).await.unwrap();

    let imported = target.get_experiences(&p).await.unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0]["notes"], "secret notes");
    let profile = target.get_profile(&p).await.unwrap().unwrap();
    assert_eq!(profile["displayName"], "Ada");
}

#[tokio::test]
async fn overwrite_import_replaces_only_that_persona() {
    let svc = service().await;
    let p1 = persona("p1");
    let p2 = persona("p2");
    svc.add_experience(&p1, json!({"name": "stale"})).await.unwrap();
    svc.add_experience(&p2, json!({"name": "other persona"})).await.unwrap();

    let mut workspace = svc.export_all(&p1).await.unwrap();
    workspace.experiences = vec![json!({"id": "fresh", "name": "fresh"})];

    svc.import_all(&workspace, &p1, ImportMode::Overwrite).await.unwrap();

    let p1_records = svc.get_experiences(&p1).await.unwrap();
    assert_eq!(p1_records.len(), 1);
    assert_eq!(p1_records[0]["name"], "fresh");

    // The other persona is untouched.
    assert_eq!(svc.get_experiences(&p2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_import_changes_nothing() {
    let svc = service().await;
    let p = persona("p1");
    svc.save_profile(&p, json!({"displayName": "Ada"})).await.unwrap();
    svc.add_experience(&p, json!({"name": "keep me"})).await.unwrap();
    svc.add_job(&p, json!({"title": "keep me too"})).await.unwrap();
    let before = svc.counts(&p).await.unwrap();

    // A good collection followed by a bad item in a later one: the import
    // dies partway through and must leave every table as it was.
    let mut workspace = svc.export_all(&p).await.unwrap();
    workspace.experiences = vec![
        json!({"id": "new-1", "name": "incoming"}),
        json!({"id": "new-2", "name": "incoming"}),
    ];
    workspace.stories = vec![json!("not an object")];

    let err = svc
        .import_all(&workspace, &p, ImportMode::Overwrite)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord(_)));

    assert_eq!(svc.counts(&p).await.unwrap(), before);
    let names: Vec<String> = svc
        .get_experiences(&p)
        .await
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["keep me".to_string()]);
    let profile = svc.get_profile(&p).await.unwrap().unwrap();
    assert_eq!(profile["displayName"], "Ada");
}

#[tokio::test]
async fn encrypted_backup_restores_onto_a_different_device() {
    let device_a = service().await;
    let p1 = persona("p1");
    device_a
        .add_experience(&p1, json!({"role": "Engineer", "notes": "private"}))
        .await
        .unwrap();

    let envelope = device_a.create_encrypted_backup(&p1, PASSWORD).await.unwrap();
    assert_eq!(envelope.kind(), Some(BackupKind::EncryptedWorkspace));

    // The backup file carries no plaintext.
    let file = serde_json::to_string(&envelope).unwrap();
    assert!(!file.contains("Engineer"));
    assert!(!file.contains("private"));

    // Different device, different secret, different persona.
    let device_b = service().await;
    let p2 = persona("p2");
    let parsed: BackupEnvelope = serde_json::from_str(&file).unwrap();
    let restored = device_b
        .restore_encrypted_backup(&parsed, PASSWORD, &p2)
        .await
        .unwrap();
    assert_eq!(restored.experiences.len(), 1);

    let records = device_b.get_experiences(&p2).await.unwrap();
    assert_eq!(records[0]["role"], "Engineer");
    assert_eq!(records[0]["notes"], "private");

    // Restored content sits encrypted under device B's own key.
    let raw = device_b
        .store()
        .backend()
        .get_all("experiences", None)
        .await
        .unwrap();
    assert_ne!(raw[0]["notes"].as_str().unwrap(), "private");
}

#[tokio::test]
async fn wrong_password_is_distinguished_from_corruption() {
    let svc = service().await;
    let p = persona("p1");
    svc.add_experience(&p, json!({"name": "x"})).await.unwrap();
    let envelope = svc.create_encrypted_backup(&p, PASSWORD).await.unwrap();

    let err = svc
        .restore_encrypted_backup(&envelope, "wrongpassword", &p)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BackupPasswordIncorrect));

    let mut corrupted = envelope.clone();
    corrupted.payload = Some("!!not-base64!!".to_string());
    let err = svc
        .restore_encrypted_backup(&corrupted, PASSWORD, &p)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BackupCorrupted(_)));
}

#[tokio::test]
async fn shareable_export_is_plaintext_without_key_material() {
    let svc = service().await;
    let p = persona("p1");
    svc.save_api_key(Provider::OpenAi, "sk-secret", None).await.unwrap();
    svc.add_experience(&p, json!({"name": "public talk"})).await.unwrap();

    let envelope = svc.export_shareable(&p).await.unwrap();
    assert_eq!(envelope.kind(), Some(BackupKind::Shareable));

    let json = serde_json::to_value(&envelope).unwrap();
    assert!(json.get("apiKeysEncrypted").is_none());
    assert_eq!(json["data"]["experiences"][0]["name"], "public talk");
    assert!(!json.to_string().contains("sk-secret"));

    let target = service().await;
    target.restore_shareable(&envelope, &p).await.unwrap();
    assert_eq!(target.get_experiences(&p).await.unwrap().len(), 1);
}

#[tokio::test]
async fn keys_only_backup_round_trips_without_touching_entities() {
    let source = service().await;
    source
        .save_api_key(Provider::Anthropic, "sk-ant-123", Some("claude".to_string()))
        .await
        .unwrap();
    source.set_active_provider(Provider::Anthropic).await.unwrap();

    let envelope = source.create_api_keys_backup(PASSWORD).await.unwrap();
    assert_eq!(envelope.kind(), Some(BackupKind::ApiKeysOnly));
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["type"], "api-keys-only");
    assert!(json.get("data").is_none());
    assert!(!json.to_string().contains("sk-ant-123"));

    let target = service().await;
    let restored = target
        .restore_api_keys_backup(&envelope, PASSWORD)
        .await
        .unwrap();
    assert_eq!(restored, vec![Provider::Anthropic]);

    let (key, model) = target.get_api_key(Provider::Anthropic).await.unwrap().unwrap();
    assert_eq!(key, "sk-ant-123");
    assert_eq!(model.as_deref(), Some("claude"));
    assert_eq!(target.get_active_provider().await.unwrap(), Some(Provider::Anthropic));

    // Restoring keys must not create entity rows.
    let counts = target.counts(&PersonaId::new("p1")).await.unwrap();
    assert!(counts.values().all(|&n| n == 0));
}

#[tokio::test]
async fn keys_backup_without_keys_is_its_own_error() {
    let svc = service().await;
    let err = svc.create_api_keys_backup(PASSWORD).await.unwrap_err();
    assert!(matches!(err, StorageError::BackupNoKeysFound));

    // A workspace envelope fed to the keys restore path has no keys
    // payload at all.
    let p = persona("p1");
    svc.add_experience(&p, json!({"name": "x"})).await.unwrap();
    let workspace_envelope = svc.export_shareable(&p).await.unwrap();
    let err = svc
        .restore_api_keys_backup(&workspace_envelope, PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BackupNoKeysFound));
}

#[tokio::test]
async fn keys_restore_with_wrong_password_fails_cleanly() {
    let source = service().await;
    source.save_api_key(Provider::Google, "g-key", None).await.unwrap();
    let envelope = source.create_api_keys_backup(PASSWORD).await.unwrap();

    let target = service().await;
    let err = target
        .restore_api_keys_backup(&envelope, "wrongpassword")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BackupPasswordIncorrect));
    assert!(target.get_api_key(Provider::Google).await.unwrap().is_none());
}
