//! Merge rules for the anonymous-profile migration.

use cleansheet_sync::merge_workspaces;
use cleansheet_types::{PersonaId, Workspace};
use pretty_assertions::assert_eq;
use serde_json::json;

fn workspace(persona: &str) -> Workspace {
    Workspace::empty(PersonaId::new(persona))
}

#[test]
fn items_sharing_an_id_keep_the_newer_stamp() {
    let mut local = workspace("p1");
    local.experiences = vec![json!({
        "id": "e1",
        "name": "local version",
        "lastModified": "2026-08-20T10:00:00Z",
    })];
    let mut remote = workspace("anon");
    remote.experiences = vec![json!({
        "id": "e1",
        "name": "remote version",
        "lastModified": "2026-08-22T10:00:00Z",
    })];

    let (merged, taken) = merge_workspaces(&local, &remote);
    assert_eq!(taken, 1);
    assert_eq!(merged.experiences.len(), 1);
    assert_eq!(merged.experiences[0]["name"], "remote version");
}

#[test]
fn older_remote_version_of_an_item_is_ignored() {
    let mut local = workspace("p1");
    local.experiences = vec![json!({
        "id": "e1",
        "name": "local version",
        "lastModified": "2026-08-22T10:00:00Z",
    })];
    let mut remote = workspace("anon");
    remote.experiences = vec![json!({
        "id": "e1",
        "name": "remote version",
        "lastModified": "2026-08-20T10:00:00Z",
    })];

    let (merged, taken) = merge_workspaces(&local, &remote);
    assert_eq!(taken, 0);
    assert_eq!(merged.experiences[0]["name"], "local version");
}

#[test]
fn disjoint_ids_are_unioned() {
    let mut local = workspace("p1");
    local.stories = vec![json!({"id": "s1", "situation": "local"})];
    let mut remote = workspace("anon");
    remote.stories = vec![json!({"id": "s2", "situation": "remote"})];

    let (merged, taken) = merge_workspaces(&local, &remote);
    assert_eq!(taken, 1);
    assert_eq!(merged.stories.len(), 2);
}

#[test]
fn idless_items_dedupe_by_structural_equality() {
    let mut local = workspace("p1");
    local.goals = vec![json!({"title": "Staff"}), json!({"title": "Public talk"})];
    let mut remote = workspace("anon");
    remote.goals = vec![json!({"title": "Staff"}), json!({"title": "Mentor"})];

    let (merged, taken) = merge_workspaces(&local, &remote);
    assert_eq!(taken, 1);
    let titles: Vec<&str> = merged.goals.iter().map(|g| g["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Staff", "Public talk", "Mentor"]);
}

#[test]
fn profile_prefers_local_unconditionally() {
    let mut local = workspace("p1");
    local.profile = Some(json!({"displayName": "Signed-in user"}));
    let mut remote = workspace("anon");
    remote.profile = Some(json!({
        "displayName": "Anonymous",
        "lastModified": "2099-01-01T00:00:00Z",
    }));

    let (merged, _) = merge_workspaces(&local, &remote);
    assert_eq!(merged.profile.unwrap()["displayName"], "Signed-in user");
}

#[test]
fn remote_profile_fills_a_missing_local_one() {
    let local = workspace("p1");
    let mut remote = workspace("anon");
    remote.profile = Some(json!({"displayName": "Anonymous"}));

    let (merged, taken) = merge_workspaces(&local, &remote);
    assert_eq!(taken, 1);
    assert!(merged.profile.is_some());
}

#[test]
fn empty_remote_changes_nothing() {
    let mut local = workspace("p1");
    local.jobs = vec![json!({"id": "j1", "title": "SRE"})];
    let remote = workspace("anon");

    let (merged, taken) = merge_workspaces(&local, &remote);
    assert_eq!(taken, 0);
    assert_eq!(merged.jobs, local.jobs);
}
