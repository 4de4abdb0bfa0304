//! Storage data model: log entries, backend configuration, retention
//! policies, and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Database,
    Hybrid,
    /// Reserved; no backend implements it.
    Cloud,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Database => "database",
            BackendKind::Hybrid => "hybrid",
            BackendKind::Cloud => "cloud",
        }
    }
}

/// On-disk compression for file-backed log segments.
///
/// LZMA and Brotli are accepted in configuration but fall back to gzip at
/// write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    Gzip,
    Lzma,
    Brotli,
}

impl CompressionKind {
    /// File extension appended to segment names, if any.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            CompressionKind::None => None,
            // Non-gzip kinds are written as gzip.
            CompressionKind::Gzip | CompressionKind::Lzma | CompressionKind::Brotli => Some("gz"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicyKind {
    TimeBased,
    SizeBased,
    CountBased,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionAction {
    Archive,
    Delete,
}

/// One named retention rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub kind: RetentionPolicyKind,
    /// Days for time-based, megabytes for size-based, entries for
    /// count-based.
    pub value: u64,
    pub action: RetentionAction,
}

/// Persisted storage configuration (`storage_config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub compression: CompressionKind,
    /// Accepted but not implemented.
    #[serde(default)]
    pub encryption_enabled: bool,
    pub retention_policy: RetentionPolicyKind,
    pub retention_value: u64,
    #[serde(default)]
    pub backup_enabled: bool,
    /// Accepted but not implemented.
    #[serde(default)]
    pub replication_enabled: bool,
    /// Controls the file backend's secondary lookup indexes. The primary
    /// index table always exists; it is the query path.
    #[serde(default = "default_true")]
    pub indexing_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            compression: CompressionKind::Gzip,
            encryption_enabled: false,
            retention_policy: RetentionPolicyKind::TimeBased,
            retention_value: 90,
            backup_enabled: false,
            replication_enabled: false,
            indexing_enabled: true,
        }
    }
}

/// One stored log record. Immutable once written; removal happens only in
/// bulk under retention filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub component: String,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// SHA-256 over the canonical JSON of all other fields; set at write
    /// time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl LogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            level: level.into(),
            component: component.into(),
            message: message.into(),
            details: Map::new(),
            tags: BTreeMap::new(),
            request_id: None,
            source_file: None,
            checksum: None,
        }
    }

    /// Canonical JSON of every field except the checksum itself. serde_json
    /// maps are BTree-backed, so key order is deterministic at every level.
    fn canonical_json(&self) -> String {
        let mut fields = Map::new();
        fields.insert("id".into(), Value::String(self.id.clone()));
        fields.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339()),
        );
        fields.insert("level".into(), Value::String(self.level.clone()));
        fields.insert("component".into(), Value::String(self.component.clone()));
        fields.insert("message".into(), Value::String(self.message.clone()));
        fields.insert("details".into(), Value::Object(self.details.clone()));
        fields.insert(
            "tags".into(),
            Value::Object(
                self.tags
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
        fields.insert(
            "request_id".into(),
            self.request_id.clone().map_or(Value::Null, Value::String),
        );
        fields.insert(
            "source_file".into(),
            self.source_file.clone().map_or(Value::Null, Value::String),
        );
        Value::Object(fields).to_string()
    }

    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Set the checksum if not already present.
    pub fn finalize(&mut self) {
        if self.checksum.is_none() {
            self.checksum = Some(self.compute_checksum());
        }
    }

    /// True when the stored checksum matches a recomputation over the
    /// current field values. Entries without a checksum fail verification.
    pub fn verify_checksum(&self) -> bool {
        self.checksum
            .as_deref()
            .map(|stored| stored == self.compute_checksum())
            .unwrap_or(false)
    }
}

/// Query filters for retrieval and deletion. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilters {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub level: Option<String>,
    pub component: Option<String>,
    pub request_id: Option<String>,
    /// Substring match on `message`.
    pub search: Option<String>,
}

impl EntryFilters {
    pub fn until(until: DateTime<Utc>) -> Self {
        Self {
            until: Some(until),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// Per-backend statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub total_entries: i64,
    pub total_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub entries_by_level: BTreeMap<String, i64>,
    pub entries_by_component: BTreeMap<String, i64>,
    pub storage_backend: BackendKind,
}
