//! Workspace merge for the one-time anonymous-profile migration.
//!
//! Deliberately not the steady-state conflict policy: steady-state sync is
//! session-level last-writer-wins in the engine. This merge runs once, when
//! a signed-in user adopts data created anonymously, and must lose nothing
//! from either side.

use chrono::{DateTime, Utc};
use cleansheet_types::{Workspace, ENTITY_COLLECTIONS};
use serde_json::Value;
use std::collections::BTreeMap;

/// Merges the remote (anonymous) workspace into the local one.
///
/// Collections merge item-wise: items sharing an id keep the newer stamp,
/// id-less items are deduplicated by structural equality. Scalar state (the
/// profile object) prefers local unconditionally — the signed-in identity
/// wins over whatever the anonymous session held.
///
/// Returns the merged workspace and how many remote items were taken.
pub fn merge_workspaces(local: &Workspace, remote: &Workspace) -> (Workspace, usize) {
    let mut merged = local.clone();
    let mut taken = 0;

    if merged.profile.is_none() {
        merged.profile = remote.profile.clone();
        if merged.profile.is_some() {
            taken += 1;
        }
    }

    for name in ENTITY_COLLECTIONS {
        let (Some(local_items), Some(remote_items)) =
            (local.collection(name), remote.collection(name))
        else {
            continue;
        };
        let (items, count) = merge_collection(local_items, remote_items);
        if let Some(target) = merged.collection_mut(name) {
            *target = items;
        }
        taken += count;
    }

    (merged, taken)
}

fn merge_collection(local: &[Value], remote: &[Value]) -> (Vec<Value>, usize) {
    let mut by_id: BTreeMap<String, usize> = BTreeMap::new();
    let mut items: Vec<Value> = Vec::with_capacity(local.len() + remote.len());
    let mut taken = 0;

    for item in local {
        if let Some(id) = item_id(item) {
            by_id.insert(id, items.len());
        }
        items.push(item.clone());
    }

    for item in remote {
        match item_id(item) {
            Some(id) => match by_id.get(&id) {
                Some(&index) => {
                    if item_stamp(item) > item_stamp(&items[index]) {
                        items[index] = item.clone();
                        taken += 1;
                    }
                }
                None => {
                    by_id.insert(id, items.len());
                    items.push(item.clone());
                    taken += 1;
                }
            },
            // No identity to match on: identical serialization means the
            // same item.
            None => {
                if !items.contains(item) {
                    items.push(item.clone());
                    taken += 1;
                }
            }
        }
    }

    (items, taken)
}

fn item_id(item: &Value) -> Option<String> {
    item.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Modification stamp used to pick between two versions of the same item.
/// `lastModified` preferred, `created` as fallback, unstamped items lose.
pub(crate) fn item_stamp(item: &Value) -> Option<DateTime<Utc>> {
    ["lastModified", "created"].iter().find_map(|field| {
        item.get(*field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    })
}
