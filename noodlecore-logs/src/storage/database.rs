//! SQLite-row storage backend.
//!
//! Unlike the file backend, rows here are the primary copy: deletion is
//! physical, and archival exports the affected rows to a compressed JSONL
//! file before removing them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::model::{BackendKind, EntryFilters, LogEntry, StorageStats};
use super::{entry_from_row, push_filters, StorageBackend};
use crate::error::StorageError;

/// Rows exported per archive file; archival loops until the matches drain.
const ARCHIVE_BATCH_LIMIT: i64 = 100_000;
/// Ids per DELETE statement, well under SQLite's bind-parameter ceiling.
const DELETE_ID_CHUNK: usize = 500;

pub struct DatabaseBackend {
    db_path: PathBuf,
    archive_dir: PathBuf,
    pool: SqlitePool,
}

impl DatabaseBackend {
    pub async fn new(
        db_path: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let db_path = db_path.into();
        let archive_dir = archive_dir.into();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Init(e.to_string()))?;
        }
        tokio::fs::create_dir_all(&archive_dir)
            .await
            .map_err(|e| StorageError::Init(e.to_string()))?;

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Init(format!("cannot open log database: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS log_entries (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                component TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT,
                tags TEXT,
                request_id TEXT,
                source_file TEXT,
                checksum TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| StorageError::Init(e.to_string()))?;
        for index_sql in [
            "CREATE INDEX IF NOT EXISTS idx_log_timestamp ON log_entries(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_log_level ON log_entries(level)",
            "CREATE INDEX IF NOT EXISTS idx_log_component ON log_entries(component)",
            "CREATE INDEX IF NOT EXISTS idx_log_request_id ON log_entries(request_id)",
        ] {
            sqlx::query(index_sql)
                .execute(&pool)
                .await
                .map_err(|e| StorageError::Init(e.to_string()))?;
        }

        Ok(Self {
            db_path,
            archive_dir,
            pool,
        })
    }

    /// Export matching rows in `batch`-sized gzip JSONL files, deleting
    /// each batch only after its file is written.
    async fn archive_in_batches(
        &self,
        filters: &EntryFilters,
        batch: i64,
    ) -> Result<u64, StorageError> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut archived = 0u64;
        let mut part = 0u32;
        loop {
            // Each batch is deleted before the next fetch, so the offset
            // stays at zero until the matches drain.
            let entries = self.retrieve_entries(filters, batch, 0).await?;
            if entries.is_empty() {
                break;
            }
            let target = self
                .archive_dir
                .join(format!("db_archive_{stamp}_{part:04}.jsonl.gz"));
            let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
            tokio::task::spawn_blocking(move || write_archive(&target, &entries))
                .await
                .map_err(|e| StorageError::Archival(e.to_string()))??;
            archived += self.delete_by_ids(&ids).await?;
            part += 1;
        }
        if archived > 0 {
            debug!(archived, "database rows archived");
        }
        Ok(archived)
    }

    /// Delete exactly the given rows; matches that have not been exported
    /// yet are left for the next archival batch.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StorageError> {
        let mut deleted = 0u64;
        for chunk in ids.chunks(DELETE_ID_CHUNK) {
            let mut builder = QueryBuilder::new("DELETE FROM log_entries WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            builder.push(")");
            deleted += builder.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(deleted)
    }
}

#[async_trait]
impl StorageBackend for DatabaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    async fn store_entry(&self, entry: &LogEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO log_entries
             (id, timestamp, level, component, message, details, tags,
              request_id, source_file, checksum)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.level)
        .bind(&entry.component)
        .bind(&entry.message)
        .bind(serde_json::to_string(&entry.details).unwrap_or_default())
        .bind(serde_json::to_string(&entry.tags).unwrap_or_default())
        .bind(&entry.request_id)
        .bind(&entry.source_file)
        .bind(&entry.checksum)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retrieve_entries(
        &self,
        filters: &EntryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogEntry>, StorageError> {
        let mut builder = QueryBuilder::new(
            "SELECT id, timestamp, level, component, message, details, tags, \
             request_id, source_file, checksum FROM log_entries WHERE 1=1",
        );
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY timestamp DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn delete_entries(&self, filters: &EntryFilters) -> Result<u64, StorageError> {
        let mut builder = QueryBuilder::new("DELETE FROM log_entries WHERE 1=1");
        push_filters(&mut builder, filters);
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Export matching rows to gzip JSONL files under the archive
    /// directory, then delete them. Every matching row reaches an archive
    /// file before removal, however many batches that takes.
    async fn archive_entries(&self, filters: &EntryFilters) -> Result<u64, StorageError> {
        self.archive_in_batches(filters, ARCHIVE_BATCH_LIMIT).await
    }

    async fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
            .fetch_one(&self.pool)
            .await?;

        let (oldest, newest): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM log_entries")
                .fetch_one(&self.pool)
                .await?;

        let by_level: Vec<(String, i64)> =
            sqlx::query_as("SELECT level, COUNT(*) FROM log_entries GROUP BY level")
                .fetch_all(&self.pool)
                .await?;
        let by_component: Vec<(String, i64)> =
            sqlx::query_as("SELECT component, COUNT(*) FROM log_entries GROUP BY component")
                .fetch_all(&self.pool)
                .await?;

        let total_size = tokio::fs::metadata(&self.db_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StorageStats {
            total_entries,
            total_size_bytes: total_size,
            compressed_size_bytes: total_size,
            oldest_entry: parse_rfc3339(oldest),
            newest_entry: parse_rfc3339(newest),
            entries_by_level: by_level.into_iter().collect(),
            entries_by_component: by_component.into_iter().collect(),
            storage_backend: BackendKind::Database,
        })
    }

    async fn optimize_storage(&self) -> Result<(), StorageError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        sqlx::query("ANALYZE").execute(&self.pool).await?;
        Ok(())
    }
}

fn parse_rfc3339(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn write_archive(target: &Path, entries: &[LogEntry]) -> Result<(), StorageError> {
    let output = fs::File::create(target)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| StorageError::Archival(e.to_string()))?;
        encoder.write_all(line.as_bytes())?;
        encoder.write_all(b"\n")?;
    }
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn entry(id: &str, level: &str, component: &str, at: DateTime<Utc>) -> LogEntry {
        let mut entry = LogEntry::new(id, at, level, component, format!("event {id} occurred"));
        entry.finalize();
        entry
    }

    async fn backend_in(dir: &TempDir) -> DatabaseBackend {
        DatabaseBackend::new(dir.path().join("log_storage.db"), dir.path().join("archive"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rows_round_trip_with_checksum() {
        let dir = TempDir::new().unwrap();
        let backend = backend_in(&dir).await;

        let stored = entry("e1", "INFO", "api", Utc::now());
        backend.store_entry(&stored).await.unwrap();

        let fetched = backend
            .retrieve_entries(&EntryFilters::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0], stored);
        assert!(fetched[0].verify_checksum());
    }

    #[tokio::test]
    async fn search_matches_message_substring() {
        let dir = TempDir::new().unwrap();
        let backend = backend_in(&dir).await;
        let now = Utc::now();
        backend.store_entry(&entry("e1", "INFO", "api", now)).await.unwrap();
        backend.store_entry(&entry("e2", "INFO", "api", now)).await.unwrap();

        let filters = EntryFilters {
            search: Some("event e2".into()),
            ..Default::default()
        };
        let found = backend.retrieve_entries(&filters, 10, 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "e2");
    }

    #[tokio::test]
    async fn delete_removes_rows_physically() {
        let dir = TempDir::new().unwrap();
        let backend = backend_in(&dir).await;
        let now = Utc::now();
        backend
            .store_entry(&entry("old", "INFO", "api", now - ChronoDuration::days(10)))
            .await
            .unwrap();
        backend.store_entry(&entry("new", "INFO", "api", now)).await.unwrap();

        let deleted = backend
            .delete_entries(&EntryFilters::until(now - ChronoDuration::days(5)))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = backend
            .retrieve_entries(&EntryFilters::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }

    #[tokio::test]
    async fn archive_exports_then_deletes() {
        let dir = TempDir::new().unwrap();
        let backend = backend_in(&dir).await;
        let now = Utc::now();
        backend
            .store_entry(&entry("old", "ERROR", "api", now - ChronoDuration::days(200)))
            .await
            .unwrap();
        backend.store_entry(&entry("new", "ERROR", "api", now)).await.unwrap();

        let archived = backend
            .archive_entries(&EntryFilters::until(now - ChronoDuration::days(100)))
            .await
            .unwrap();
        assert_eq!(archived, 1);

        let remaining = backend
            .retrieve_entries(&EntryFilters::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");

        let archives: Vec<_> = std::fs::read_dir(dir.path().join("archive"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".jsonl.gz"))
            .collect();
        assert_eq!(archives.len(), 1);
    }

    #[tokio::test]
    async fn archival_drains_matches_beyond_one_batch() {
        let dir = TempDir::new().unwrap();
        let backend = backend_in(&dir).await;
        let old = Utc::now() - ChronoDuration::days(200);
        for i in 0..3 {
            backend
                .store_entry(&entry(&format!("e{i}"), "INFO", "api", old))
                .await
                .unwrap();
        }

        let archived = backend
            .archive_in_batches(&EntryFilters::default(), 1)
            .await
            .unwrap();
        assert_eq!(archived, 3);

        let remaining = backend
            .retrieve_entries(&EntryFilters::default(), 10, 0)
            .await
            .unwrap();
        assert!(remaining.is_empty());

        // One archive file per batch, none of the rows dropped unexported.
        let archives: Vec<_> = std::fs::read_dir(dir.path().join("archive"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".jsonl.gz"))
            .collect();
        assert_eq!(archives.len(), 3);
    }

    #[tokio::test]
    async fn stats_group_by_level_and_component() {
        let dir = TempDir::new().unwrap();
        let backend = backend_in(&dir).await;
        let now = Utc::now();
        backend.store_entry(&entry("e1", "INFO", "api", now)).await.unwrap();
        backend.store_entry(&entry("e2", "ERROR", "worker", now)).await.unwrap();

        let stats = backend.get_stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.entries_by_level["INFO"], 1);
        assert_eq!(stats.entries_by_component["worker"], 1);
        assert_eq!(stats.storage_backend, BackendKind::Database);
    }
}
