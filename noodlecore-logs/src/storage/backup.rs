//! Timestamped full-tree backups of the storage directory.
//!
//! Each run copies the storage tree into
//! `<backup_dir>/noodlecore_backup_<yyyymmdd_HHMMSS>/storage` and then
//! prunes backups whose embedded timestamp is older than the retention
//! window. Directories whose names do not parse are left alone.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::BackupSettings;
use crate::error::StorageError;

const BACKUP_PREFIX: &str = "noodlecore_backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct BackupManager {
    source_dir: PathBuf,
    backup_dir: PathBuf,
    retention_days: i64,
    enabled: bool,
}

impl BackupManager {
    pub fn new(source_dir: impl Into<PathBuf>, settings: &BackupSettings) -> Self {
        let source_dir = source_dir.into();
        let backup_dir = settings
            .backup_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| source_dir.join("backups"));
        Self {
            source_dir,
            backup_dir,
            retention_days: settings.retention_days,
            enabled: settings.enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Copy the storage tree into a fresh timestamped directory and prune
    /// expired backups. Returns the new backup path.
    pub async fn perform_backup(&self) -> Result<PathBuf, StorageError> {
        let backup_name = format!("{BACKUP_PREFIX}{}", Utc::now().format(TIMESTAMP_FORMAT));
        let backup_path = self.backup_dir.join(backup_name);
        let source = self.source_dir.clone();
        let backup_root = self.backup_dir.clone();
        let target = backup_path.join("storage");

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&target).map_err(|e| StorageError::Backup(e.to_string()))?;
            // The backup root may live inside the storage tree; never
            // recurse into it.
            copy_tree(&source, &target, &backup_root)
        })
        .await
        .map_err(|e| StorageError::Backup(e.to_string()))??;

        info!(path = %backup_path.display(), "backup completed");

        if let Err(e) = self.prune_old_backups().await {
            warn!(error = %e, "backup pruning failed");
        }
        Ok(backup_path)
    }

    /// Remove backups older than the retention window, judged by the
    /// timestamp embedded in the directory name.
    pub async fn prune_old_backups(&self) -> Result<u64, StorageError> {
        let backup_dir = self.backup_dir.clone();
        let cutoff = (Utc::now() - ChronoDuration::days(self.retention_days)).naive_utc();

        tokio::task::spawn_blocking(move || {
            let mut removed = 0;
            if !backup_dir.exists() {
                return Ok(removed);
            }
            for entry in fs::read_dir(&backup_dir).map_err(StorageError::from)? {
                let entry = entry.map_err(StorageError::from)?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let Some(timestamp) = name
                    .to_str()
                    .and_then(|n| n.strip_prefix(BACKUP_PREFIX))
                else {
                    continue;
                };
                let Ok(backup_time) = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
                else {
                    // Not one of ours; leave it.
                    continue;
                };
                if backup_time < cutoff {
                    fs::remove_dir_all(&path).map_err(StorageError::from)?;
                    debug!(path = %path.display(), "expired backup removed");
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| StorageError::Backup(e.to_string()))?
    }
}

fn copy_tree(source: &Path, target: &Path, skip: &Path) -> Result<(), StorageError> {
    for entry in fs::read_dir(source).map_err(StorageError::from)? {
        let entry = entry.map_err(StorageError::from)?;
        let path = entry.path();
        if path == skip {
            continue;
        }
        let dest = target.join(entry.file_name());
        if path.is_dir() {
            fs::create_dir_all(&dest).map_err(StorageError::from)?;
            copy_tree(&path, &dest, skip)?;
        } else {
            fs::copy(&path, &dest).map_err(StorageError::from)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(backup_dir: Option<&Path>, retention_days: i64) -> BackupSettings {
        BackupSettings {
            enabled: true,
            interval_hours: 24,
            backup_dir: backup_dir.map(|p| p.to_string_lossy().into_owned()),
            retention_days,
        }
    }

    #[tokio::test]
    async fn backup_copies_storage_tree() {
        let source = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        std::fs::create_dir_all(source.path().join("file_storage/logs")).unwrap();
        std::fs::write(source.path().join("storage_config.json"), "{}").unwrap();
        std::fs::write(
            source.path().join("file_storage/logs/app.log"),
            "line\n",
        )
        .unwrap();

        let manager = BackupManager::new(source.path(), &settings(Some(backups.path()), 30));
        let backup_path = manager.perform_backup().await.unwrap();

        assert!(backup_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(BACKUP_PREFIX));
        assert!(backup_path.join("storage/storage_config.json").exists());
        assert!(backup_path.join("storage/file_storage/logs/app.log").exists());
    }

    #[tokio::test]
    async fn nested_backup_dir_is_not_copied_into_itself() {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("storage_config.json"), "{}").unwrap();

        // Default backup dir lives inside the storage tree.
        let manager = BackupManager::new(source.path(), &settings(None, 30));
        let backup_path = manager.perform_backup().await.unwrap();

        assert!(backup_path.join("storage/storage_config.json").exists());
        assert!(!backup_path.join("storage/backups").exists());
    }

    #[tokio::test]
    async fn prune_removes_expired_and_skips_foreign_dirs() {
        let source = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();

        let expired = backups.path().join("noodlecore_backup_20200101_000000");
        let foreign = backups.path().join("manual_copy");
        std::fs::create_dir_all(&expired).unwrap();
        std::fs::create_dir_all(&foreign).unwrap();

        let manager = BackupManager::new(source.path(), &settings(Some(backups.path()), 30));
        let removed = manager.prune_old_backups().await.unwrap();

        assert_eq!(removed, 1);
        assert!(!expired.exists());
        assert!(foreign.exists());
    }
}
