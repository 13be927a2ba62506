//! One-time migration from the legacy flat key store.

use cleansheet_crypto::{DeviceCrypto, DeviceSecret};
use cleansheet_storage::{MemoryBackend, MemoryLegacyStore, StorageService};
use cleansheet_types::PersonaId;
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

fn legacy_fixture(persona: &str) -> MemoryLegacyStore {
    let legacy = MemoryLegacyStore::new();
    legacy.set_item("userProfile", json!({"displayName": "Ada"}).to_string());
    legacy.set_item(
        "user_experiences",
        json!([{"name": "Rewrite", "notes": "n1"}, {"id": "kept", "name": "Launch"}]).to_string(),
    );
    legacy.set_item("user_stories", json!([{"situation": "outage"}]).to_string());
    legacy.set_item("user_jobs", json!([{"title": "SRE"}]).to_string());
    legacy.set_item(
        format!("userGoals_{persona}"),
        json!([{"title": "Staff"}]).to_string(),
    );
    legacy.set_item(
        format!("diagrams_{persona}"),
        json!([{"diagramData": {"nodes": []}}]).to_string(),
    );
    legacy
}

#[tokio::test]
async fn migrates_known_keys_into_tables() {
    let svc = service().await;
    let p = PersonaId::new("p1");
    let legacy = legacy_fixture("p1");

    let report = svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    assert!(!report.already_completed);
    assert!(!report.is_partial());
    assert_eq!(report.migrated["profiles"], 1);
    assert_eq!(report.migrated["experiences"], 2);
    assert_eq!(report.migrated["stories"], 1);
    assert_eq!(report.migrated["jobs"], 1);
    assert_eq!(report.migrated["goals"], 1);
    assert_eq!(report.migrated["diagrams"], 1);

    let profile = svc.get_profile(&p).await.unwrap().unwrap();
    assert_eq!(profile["displayName"], "Ada");

    let experiences = svc.get_experiences(&p).await.unwrap();
    assert_eq!(experiences.len(), 2);
    // Each item got a persona stamp and an id; pre-existing ids survive.
    assert!(experiences.iter().all(|e| e["personaId"] == "p1"));
    assert!(experiences.iter().any(|e| e["id"] == "kept"));
}

#[tokio::test]
async fn alternate_legacy_key_names_are_checked() {
    let svc = service().await;
    let p = PersonaId::new("p1");
    let legacy = MemoryLegacyStore::new();
    legacy.set_item(
        "cleansheet_experiences",
        json!([{"name": "from older key"}]).to_string(),
    );
    legacy.set_item(
        "user_documents_p1",
        json!([{"title": "Resume"}]).to_string(),
    );

    let report = svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    assert_eq!(report.migrated["experiences"], 1);
    assert_eq!(report.migrated["documents"], 1);
}

#[tokio::test]
async fn migration_runs_only_once() {
    let svc = service().await;
    let p = PersonaId::new("p1");
    let legacy = legacy_fixture("p1");

    svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    let second = svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    assert!(second.already_completed);
    assert!(second.migrated.is_empty());

    // No duplicates.
    assert_eq!(svc.get_experiences(&p).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unparseable_key_is_skipped_not_fatal() {
    let svc = service().await;
    let p = PersonaId::new("p1");
    let legacy = MemoryLegacyStore::new();
    legacy.set_item("user_stories", "{not json");
    legacy.set_item("user_jobs", json!([{"title": "SRE"}]).to_string());

    let report = svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    assert!(report.is_partial());
    assert_eq!(report.failed_keys, vec!["user_stories".to_string()]);
    assert_eq!(report.migrated["jobs"], 1);
    assert!(svc.get_stories(&p).await.unwrap().is_empty());

    // A partial run still completes: it does not retry forever.
    let second = svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    assert!(second.already_completed);
}

#[tokio::test]
async fn empty_legacy_store_migrates_nothing() {
    let svc = service().await;
    let p = PersonaId::new("p1");
    let legacy = MemoryLegacyStore::new();

    let report = svc.migrate_from_legacy(&legacy, &p).await.unwrap();
    assert!(report.migrated.is_empty());
    assert!(report.failed_keys.is_empty());
}
