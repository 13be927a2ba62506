//! Hybrid load/save: remote-first reads, debounced remote writes.

mod support;

use cleansheet_sync::{HybridStore, MemoryObjectStore, ObjectStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::storage;

const DEBOUNCE: Duration = Duration::from_millis(30);

async fn hybrid() -> (Arc<MemoryObjectStore>, HybridStore) {
    let remote = Arc::new(MemoryObjectStore::new());
    let store = HybridStore::new(storage().await, remote.clone(), DEBOUNCE);
    (remote, store)
}

#[tokio::test]
async fn load_prefers_remote_and_refreshes_the_cache() {
    let (remote, store) = hybrid().await;
    remote.put("prefs/theme", &json!("dark")).await.unwrap();

    assert_eq!(store.load("prefs/theme").await.unwrap(), Some(json!("dark")));

    // Remote goes away; the mirrored copy still answers.
    remote.set_failing(true);
    assert_eq!(store.load("prefs/theme").await.unwrap(), Some(json!("dark")));
}

#[tokio::test]
async fn load_of_an_unknown_key_is_none() {
    let (_remote, store) = hybrid().await;
    assert_eq!(store.load("prefs/missing").await.unwrap(), None);
}

#[tokio::test]
async fn save_is_locally_visible_before_the_upload() {
    let (remote, store) = hybrid().await;
    store.save("prefs/theme", json!("light")).await.unwrap();

    // Not uploaded yet, but the local copy already serves reads.
    assert!(!remote.contains("prefs/theme"));
    assert_eq!(store.load("prefs/theme").await.unwrap(), Some(json!("light")));

    tokio::time::sleep(DEBOUNCE * 3).await;
    assert_eq!(
        remote.get("prefs/theme").await.unwrap(),
        Some(json!("light"))
    );
}

#[tokio::test]
async fn rapid_saves_collapse_into_one_upload() {
    let (remote, store) = hybrid().await;
    for i in 0..5 {
        store.save("prefs/draft", json!(i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(DEBOUNCE * 3).await;

    assert_eq!(remote.put_count(), 1);
    assert_eq!(remote.get("prefs/draft").await.unwrap(), Some(json!(4)));
}

#[tokio::test]
async fn failed_upload_keeps_the_local_copy() {
    let (remote, store) = hybrid().await;
    remote.set_failing(true);
    store.save("prefs/theme", json!("solar")).await.unwrap();
    tokio::time::sleep(DEBOUNCE * 3).await;

    assert!(!remote.contains("prefs/theme"));
    assert_eq!(store.load("prefs/theme").await.unwrap(), Some(json!("solar")));
}

#[tokio::test]
async fn flush_uploads_without_waiting() {
    let (remote, store) = hybrid().await;
    store.save("prefs/a", json!(1)).await.unwrap();
    store.save("prefs/b", json!(2)).await.unwrap();

    store.flush().await;
    assert_eq!(remote.get("prefs/a").await.unwrap(), Some(json!(1)));
    assert_eq!(remote.get("prefs/b").await.unwrap(), Some(json!(2)));
}
