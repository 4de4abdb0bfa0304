//! Log storage: pluggable backends behind one trait, an orchestrating
//! manager, retention policies, and backups.

pub mod backup;
pub mod database;
pub mod file_backend;
pub mod manager;
pub mod model;
pub mod retention;

pub use backup::BackupManager;
pub use database::DatabaseBackend;
pub use file_backend::FileBackend;
pub use manager::{LogStorageManager, ManagerOverall, ManagerStats, StorageManagerOptions};
pub use model::{
    BackendKind, CompressionKind, EntryFilters, LogEntry, RetentionAction, RetentionPolicy,
    RetentionPolicyKind, StorageConfig, StorageStats,
};
pub use retention::RetentionManager;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::StorageError;

/// Common surface of the file and database backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn store_entry(&self, entry: &LogEntry) -> Result<(), StorageError>;

    /// Matching entries, newest first.
    async fn retrieve_entries(
        &self,
        filters: &EntryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogEntry>, StorageError>;

    /// Remove matching entries; returns the number removed.
    async fn delete_entries(&self, filters: &EntryFilters) -> Result<u64, StorageError>;

    /// Move matching entries out of the live data set, preserving them in
    /// compressed archive form where the backend supports it.
    async fn archive_entries(&self, filters: &EntryFilters) -> Result<u64, StorageError>;

    async fn get_stats(&self) -> Result<StorageStats, StorageError>;

    /// Compact the backend and sweep aged data into archives.
    async fn optimize_storage(&self) -> Result<(), StorageError>;
}

/// Append `filters` as AND clauses to a query ending in `WHERE 1=1`.
pub(crate) fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &EntryFilters) {
    if let Some(since) = filters.since {
        builder.push(" AND timestamp >= ");
        builder.push_bind(since.to_rfc3339());
    }
    if let Some(until) = filters.until {
        builder.push(" AND timestamp <= ");
        builder.push_bind(until.to_rfc3339());
    }
    if let Some(level) = &filters.level {
        builder.push(" AND level = ");
        builder.push_bind(level.clone());
    }
    if let Some(component) = &filters.component {
        builder.push(" AND component = ");
        builder.push_bind(component.clone());
    }
    if let Some(request_id) = &filters.request_id {
        builder.push(" AND request_id = ");
        builder.push_bind(request_id.clone());
    }
    if let Some(search) = &filters.search {
        builder.push(" AND message LIKE ");
        builder.push_bind(format!("%{search}%"));
    }
}

pub(crate) fn entry_from_row(row: &SqliteRow) -> Result<LogEntry, StorageError> {
    let timestamp: String = row.try_get("timestamp")?;
    let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| StorageError::Backend(format!("bad timestamp in row: {e}")))?
        .with_timezone(&chrono::Utc);

    let details: Option<String> = row.try_get("details")?;
    let tags: Option<String> = row.try_get("tags")?;

    Ok(LogEntry {
        id: row.try_get("id")?,
        timestamp,
        level: row.try_get("level")?,
        component: row.try_get("component")?,
        message: row.try_get("message")?,
        details: details
            .as_deref()
            .and_then(|d| serde_json::from_str(d).ok())
            .unwrap_or_default(),
        tags: tags
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default(),
        request_id: row.try_get("request_id")?,
        source_file: row.try_get("source_file")?,
        checksum: row.try_get("checksum")?,
    })
}
