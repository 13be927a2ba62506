//! The workspace aggregate — one persona's full data set, used as the unit
//! of export, import and sync.

use crate::ids::PersonaId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Names of the entity collections carried by a workspace, in export order.
/// The profile singleton is kept separately.
pub const ENTITY_COLLECTIONS: [&str; 7] = [
    "experiences",
    "stories",
    "jobs",
    "goals",
    "portfolio",
    "documents",
    "diagrams",
];

/// All entities belonging to one persona.
///
/// Entity records are kept as JSON objects rather than typed structs: the
/// storage layer is schema-light and the encryption middleware operates on
/// field names, so a record's exact shape is owned by the feature that
/// writes it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub persona_id: PersonaId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    #[serde(default)]
    pub experiences: Vec<Value>,
    #[serde(default)]
    pub stories: Vec<Value>,
    #[serde(default)]
    pub jobs: Vec<Value>,
    #[serde(default)]
    pub goals: Vec<Value>,
    #[serde(default)]
    pub portfolio: Vec<Value>,
    #[serde(default)]
    pub documents: Vec<Value>,
    #[serde(default)]
    pub diagrams: Vec<Value>,
}

impl Workspace {
    /// An empty workspace stamped with the current time.
    pub fn empty(persona_id: PersonaId) -> Self {
        Self {
            version: crate::backup::BACKUP_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
            persona_id,
            profile: None,
            experiences: Vec::new(),
            stories: Vec::new(),
            jobs: Vec::new(),
            goals: Vec::new(),
            portfolio: Vec::new(),
            documents: Vec::new(),
            diagrams: Vec::new(),
        }
    }

    pub fn collection(&self, name: &str) -> Option<&Vec<Value>> {
        match name {
            "experiences" => Some(&self.experiences),
            "stories" => Some(&self.stories),
            "jobs" => Some(&self.jobs),
            "goals" => Some(&self.goals),
            "portfolio" => Some(&self.portfolio),
            "documents" => Some(&self.documents),
            "diagrams" => Some(&self.diagrams),
            _ => None,
        }
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        match name {
            "experiences" => Some(&mut self.experiences),
            "stories" => Some(&mut self.stories),
            "jobs" => Some(&mut self.jobs),
            "goals" => Some(&mut self.goals),
            "portfolio" => Some(&mut self.portfolio),
            "documents" => Some(&mut self.documents),
            "diagrams" => Some(&mut self.diagrams),
            _ => None,
        }
    }

    /// Record counts per collection (profile counted as 0 or 1).
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        counts.insert("profiles", usize::from(self.profile.is_some()));
        for name in ENTITY_COLLECTIONS {
            if let Some(items) = self.collection(name) {
                counts.insert(name, items.len());
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.profile.is_none() && ENTITY_COLLECTIONS.iter().all(|c| {
            self.collection(c).map(Vec::is_empty).unwrap_or(true)
        })
    }
}
