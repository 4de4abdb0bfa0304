//! File-backed storage: append-only JSONL segments partitioned by date and
//! component, with a side SQLite index for filtered queries.
//!
//! Segments are never rewritten. Deletion removes index rows only; physical
//! removal happens when the archival sweep moves aged segments out of the
//! live tree. Compressed appends write one gzip member per entry, which
//! keeps appends cheap and still decodes as a single stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::model::{BackendKind, CompressionKind, EntryFilters, LogEntry, StorageStats};
use super::{entry_from_row, push_filters, StorageBackend};
use crate::error::StorageError;

/// Segments older than this many days are moved to the archive tree during
/// `optimize_storage`.
const ARCHIVE_AGE_DAYS: u64 = 30;

pub struct FileBackend {
    logs_dir: PathBuf,
    archive_dir: PathBuf,
    compression: CompressionKind,
    pool: SqlitePool,
    /// Serializes segment appends; the index pool handles its own locking.
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub async fn new(
        storage_dir: impl Into<PathBuf>,
        compression: CompressionKind,
        indexing_enabled: bool,
    ) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.into();
        let logs_dir = storage_dir.join("logs");
        let index_dir = storage_dir.join("indexes");
        let archive_dir = storage_dir.join("archive");
        for dir in [&logs_dir, &index_dir, &archive_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::Init(format!("cannot create {}: {e}", dir.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(index_dir.join("log_index.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Init(format!("cannot open file storage index: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS log_entries (
                id TEXT PRIMARY KEY,
                timestamp TEXT,
                level TEXT,
                component TEXT,
                message TEXT,
                details TEXT,
                tags TEXT,
                request_id TEXT,
                source_file TEXT,
                checksum TEXT,
                file_path TEXT
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| StorageError::Indexing(e.to_string()))?;
        // The table itself is the read path and always exists; the flag only
        // controls the secondary lookup indexes.
        if indexing_enabled {
            for index_sql in [
                "CREATE INDEX IF NOT EXISTS idx_timestamp ON log_entries(timestamp)",
                "CREATE INDEX IF NOT EXISTS idx_level ON log_entries(level)",
                "CREATE INDEX IF NOT EXISTS idx_component ON log_entries(component)",
            ] {
                sqlx::query(index_sql)
                    .execute(&pool)
                    .await
                    .map_err(|e| StorageError::Indexing(e.to_string()))?;
            }
        }

        Ok(Self {
            logs_dir,
            archive_dir,
            compression,
            pool,
            write_lock: Mutex::new(()),
        })
    }

    /// `logs/yyyy/mm/dd/<component>_<yyyymmdd>.log[.gz]`
    fn segment_path(&self, entry: &LogEntry) -> PathBuf {
        let date_dir = self
            .logs_dir
            .join(entry.timestamp.format("%Y/%m/%d").to_string());
        let mut file_name = format!(
            "{}_{}.log",
            entry.component,
            entry.timestamp.format("%Y%m%d")
        );
        if let Some(ext) = self.compression.extension() {
            file_name.push('.');
            file_name.push_str(ext);
        }
        date_dir.join(file_name)
    }

    async fn update_index(&self, entry: &LogEntry, file_path: &Path) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO log_entries
             (id, timestamp, level, component, message, details, tags,
              request_id, source_file, checksum, file_path)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
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
        .bind(file_path.to_string_lossy().into_owned())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Indexing(e.to_string()))?;
        Ok(())
    }

    /// Move segments older than [`ARCHIVE_AGE_DAYS`] into the archive tree,
    /// compressing any that are still plain text.
    async fn archive_old_segments(&self) -> Result<u64, StorageError> {
        let logs_dir = self.logs_dir.clone();
        let archive_dir = self.archive_dir.clone();
        tokio::task::spawn_blocking(move || sweep_segments(&logs_dir, &archive_dir))
            .await
            .map_err(|e| StorageError::Archival(e.to_string()))?
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    async fn store_entry(&self, entry: &LogEntry) -> Result<(), StorageError> {
        let path = self.segment_path(entry);
        let line = serde_json::to_string(entry)
            .map_err(|e| StorageError::Backend(format!("cannot serialize entry: {e}")))?;
        let compressed = self.compression.extension().is_some();

        let _guard = self.write_lock.lock().await;
        tokio::task::spawn_blocking(move || append_line(&path, &line, compressed))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))??;

        // Index failures must not lose the already-written entry.
        if let Err(e) = self.update_index(entry, &self.segment_path(entry)).await {
            warn!(entry_id = %entry.id, error = %e, "index update failed");
        }
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

    /// Logical deletion: removes index rows only. Segment files stay in
    /// place until the archival sweep retires them.
    async fn delete_entries(&self, filters: &EntryFilters) -> Result<u64, StorageError> {
        let mut builder = QueryBuilder::new("DELETE FROM log_entries WHERE 1=1");
        push_filters(&mut builder, filters);
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Archival for the file backend drops index rows; the raw segments are
    /// preserved and later retired by the sweep in `optimize_storage`.
    async fn archive_entries(&self, filters: &EntryFilters) -> Result<u64, StorageError> {
        let removed = self.delete_entries(filters).await?;
        if removed > 0 {
            debug!(removed, "entries unindexed pending segment archival");
        }
        Ok(removed)
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

        let logs_dir = self.logs_dir.clone();
        let total_size = tokio::task::spawn_blocking(move || dir_size(&logs_dir))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))??;

        Ok(StorageStats {
            total_entries,
            total_size_bytes: total_size,
            compressed_size_bytes: total_size,
            oldest_entry: parse_rfc3339(oldest),
            newest_entry: parse_rfc3339(newest),
            entries_by_level: by_level.into_iter().collect(),
            entries_by_component: by_component.into_iter().collect(),
            storage_backend: BackendKind::File,
        })
    }

    async fn optimize_storage(&self) -> Result<(), StorageError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        sqlx::query("ANALYZE").execute(&self.pool).await?;

        // Archival failures are logged, never fatal to optimization.
        match self.archive_old_segments().await {
            Ok(moved) if moved > 0 => debug!(moved, "segments archived"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "segment archival sweep failed"),
        }
        Ok(())
    }
}

fn parse_rfc3339(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn append_line(path: &Path, line: &str, compressed: bool) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    if compressed {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(line.as_bytes())?;
        encoder.write_all(b"\n")?;
        encoder.finish()?;
    } else {
        let mut file = file;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn dir_size(dir: &Path) -> Result<u64, StorageError> {
    let mut total = 0;
    if !dir.exists() {
        return Ok(total);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            total += dir_size(&path)?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StorageError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn sweep_segments(logs_dir: &Path, archive_dir: &Path) -> Result<u64, StorageError> {
    let cutoff = SystemTime::now() - std::time::Duration::from_secs(ARCHIVE_AGE_DAYS * 86_400);
    let mut files = Vec::new();
    collect_files(logs_dir, &mut files)?;

    let mut moved = 0;
    for path in files {
        let modified = path.metadata()?.modified()?;
        if modified >= cutoff {
            continue;
        }
        let relative = path
            .strip_prefix(logs_dir)
            .map_err(|e| StorageError::Archival(e.to_string()))?;
        let target = archive_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&path, &target)?;

        let already_compressed = matches!(
            target.extension().and_then(|e| e.to_str()),
            Some("gz" | "bz2" | "xz")
        );
        if !already_compressed {
            // Keep the original if compression fails.
            if let Err(e) = compress_file(&target) {
                warn!(path = %target.display(), error = %e, "archive compression failed");
            }
        }
        moved += 1;
    }
    Ok(moved)
}

fn compress_file(path: &Path) -> Result<(), StorageError> {
    let mut target = path.as_os_str().to_owned();
    target.push(".gz");
    let mut input = fs::File::open(path)?;
    let output = fs::File::create(&target)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)?;
    Ok(())
}
