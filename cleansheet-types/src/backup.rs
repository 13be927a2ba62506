//! Portable backup envelopes and the canonical LLM provider enum.

use crate::workspace::Workspace;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Format version stamped on exports and backups.
pub const BACKUP_FORMAT_VERSION: &str = "3.0";

/// Canonical LLM provider identifier.
///
/// Historically provider names floated around in mixed casing ("OpenAI",
/// "openai", "OPENAI"); all internal lookups use this enum's lowercase
/// canonical form and display casing lives only in [`Provider::label`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    Ollama,
}

impl Provider {
    /// Display label with vendor casing. Never used for lookups.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Google => "Google",
            Provider::Mistral => "Mistral",
            Provider::Ollama => "Ollama",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown provider: {0}")]
pub struct ProviderParseError(pub String);

impl FromStr for Provider {
    type Err = ProviderParseError;

    /// Accepts any casing and normalizes at the boundary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            "mistral" => Ok(Provider::Mistral),
            "ollama" => Ok(Provider::Ollama),
            other => Err(ProviderParseError(other.to_string())),
        }
    }
}

/// One provider's stored key material inside a keys backup. The `api_key`
/// value is always a ciphertext token, never plaintext.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderKey {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Encrypted API-key payload carried by a backup envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeysBackup {
    pub encrypted: bool,
    pub providers: Vec<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_provider: Option<Provider>,
    pub data: BTreeMap<Provider, ProviderKey>,
}

impl ApiKeysBackup {
    /// A backup claiming `encrypted: true` must name at least one provider
    /// and carry a matching non-empty data map. An empty payload is a
    /// distinct "no keys found" condition, not a password problem.
    pub fn has_keys(&self) -> bool {
        !self.providers.is_empty()
            && !self.data.is_empty()
            && self.providers.iter().all(|p| self.data.contains_key(p))
    }
}

/// Which flavor of backup an envelope carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupKind {
    /// Full workspace, password-encrypted as a single blob.
    EncryptedWorkspace,
    /// Plaintext workspace with no key material field at all.
    Shareable,
    /// API keys only; entity data omitted entirely.
    ApiKeysOnly,
}

/// Portable, human-inspectable backup file (JSON).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    pub version: String,
    pub export_date: DateTime<Utc>,
    /// `"api-keys-only"` for a keys-only export; absent otherwise.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind_tag: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encrypted: bool,
    /// Whole-workspace ciphertext token (password-encrypted backups only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Plaintext workspace (shareable exports only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Workspace>,
    /// A shareable export omits this field entirely — not merely blanked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys_encrypted: Option<ApiKeysBackup>,
}

impl BackupEnvelope {
    pub fn encrypted_workspace(payload: String) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
            kind_tag: None,
            encrypted: true,
            payload: Some(payload),
            data: None,
            api_keys_encrypted: None,
        }
    }

    pub fn shareable(workspace: Workspace) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
            kind_tag: None,
            encrypted: false,
            payload: None,
            data: Some(workspace),
            api_keys_encrypted: None,
        }
    }

    pub fn api_keys_only(keys: ApiKeysBackup) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
            kind_tag: Some("api-keys-only".to_string()),
            encrypted: false,
            payload: None,
            data: None,
            api_keys_encrypted: Some(keys),
        }
    }

    pub fn kind(&self) -> Option<BackupKind> {
        if self.kind_tag.as_deref() == Some("api-keys-only") {
            Some(BackupKind::ApiKeysOnly)
        } else if self.encrypted && self.payload.is_some() {
            Some(BackupKind::EncryptedWorkspace)
        } else if self.data.is_some() {
            Some(BackupKind::Shareable)
        } else {
            None
        }
    }
}

/// Filename for a downloadable backup: `cleansheet-backup-YYYY-MM-DD.json`
/// or `cleansheet-api-keys-YYYY-MM-DD.json`.
pub fn backup_file_name(kind: BackupKind, date: NaiveDate) -> String {
    let tag = match kind {
        BackupKind::ApiKeysOnly => "api-keys",
        BackupKind::EncryptedWorkspace | BackupKind::Shareable => "backup",
    };
    format!("cleansheet-{tag}-{}.json", date.format("%Y-%m-%d"))
}
