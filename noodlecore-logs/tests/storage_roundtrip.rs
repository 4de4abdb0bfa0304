//! Storage integration tests: bulk filtered retrieval, checksum
//! round-trips, and retention cutoffs through the manager API.

use anyhow::Result;
use chrono::{Duration, Utc};
use noodlecore_logs::storage::{
    EntryFilters, LogEntry, LogStorageManager, RetentionAction, RetentionPolicy,
    RetentionPolicyKind,
};
use noodlecore_logs::{BackendKind, LogsConfig, StorageConfig};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

fn write_config(dir: &TempDir, config: &StorageConfig) {
    let json = serde_json::to_string_pretty(config).unwrap();
    std::fs::write(dir.path().join("storage_config.json"), json).unwrap();
}

#[tokio::test]
async fn bulk_filtered_retrieval_is_newest_first() -> Result<()> {
    let dir = TempDir::new()?;
    write_config(
        &dir,
        &StorageConfig {
            backend: BackendKind::Database,
            ..Default::default()
        },
    );
    let manager = LogStorageManager::new(dir.path(), &LogsConfig::default()).await?;

    let base = Utc::now() - Duration::hours(1);
    for i in 0..1000 {
        let component = if i % 2 == 0 { "a" } else { "b" };
        let level = if i % 4 < 2 { "INFO" } else { "ERROR" };
        let mut entry = LogEntry::new(
            Uuid::new_v4().to_string(),
            base + Duration::seconds(i),
            level,
            component,
            format!("event {i}"),
        );
        entry.details.insert("i".into(), json!(i));
        manager.store_log_entry(entry).await?;
    }

    let filters = EntryFilters::default()
        .with_component("a")
        .with_level("ERROR");
    let entries = manager.retrieve_log_entries(&filters, 1000, 0).await?;

    // i % 2 == 0 and i % 4 >= 2 means i % 4 == 2: exactly a quarter.
    assert_eq!(entries.len(), 250);
    assert!(entries
        .iter()
        .all(|e| e.component == "a" && e.level == "ERROR"));
    assert!(entries.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    Ok(())
}

#[tokio::test]
async fn stored_entries_round_trip_with_valid_checksum() -> Result<()> {
    let dir = TempDir::new()?;
    let manager = LogStorageManager::new(dir.path(), &LogsConfig::default()).await?;

    let mut entry = LogEntry::new(
        "roundtrip-1",
        Utc::now(),
        "WARN",
        "api",
        "slow response on /v1/query",
    );
    entry.details.insert("latency_ms".into(), json!(940));
    entry.tags.insert("region".into(), "eu-west".into());
    entry.request_id = Some("req-42".into());

    manager.store_log_entry(entry).await?;

    let filters = EntryFilters {
        request_id: Some("req-42".into()),
        ..Default::default()
    };
    let fetched = manager.retrieve_log_entries(&filters, 10, 0).await?;
    assert_eq!(fetched.len(), 1);
    let entry = &fetched[0];
    assert_eq!(entry.id, "roundtrip-1");
    assert_eq!(entry.details["latency_ms"], json!(940));
    assert_eq!(entry.tags["region"], "eu-west");
    assert!(entry.verify_checksum());
    Ok(())
}

#[tokio::test]
async fn retention_cutoff_leaves_newer_entries_untouched() -> Result<()> {
    let dir = TempDir::new()?;
    write_config(
        &dir,
        &StorageConfig {
            backend: BackendKind::Database,
            ..Default::default()
        },
    );
    let manager = LogStorageManager::new(dir.path(), &LogsConfig::default()).await?;

    let now = Utc::now();
    for (id, age_days) in [("d100", 100), ("d50", 50), ("d1", 1)] {
        manager
            .store_log_entry(LogEntry::new(
                id,
                now - Duration::days(age_days),
                "INFO",
                "api",
                format!("entry aged {age_days} days"),
            ))
            .await?;
    }

    // Tighten retention to 30 days with a hard delete.
    manager
        .add_retention_policy(
            "short",
            RetentionPolicy {
                kind: RetentionPolicyKind::TimeBased,
                value: 30,
                action: RetentionAction::Delete,
            },
        )
        .await;
    manager.run_maintenance_cycle().await?;

    let remaining = manager
        .retrieve_log_entries(&EntryFilters::default(), 10, 0)
        .await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "d1");
    Ok(())
}

#[tokio::test]
async fn hybrid_mode_stores_to_both_backends() -> Result<()> {
    let dir = TempDir::new()?;
    write_config(
        &dir,
        &StorageConfig {
            backend: BackendKind::Hybrid,
            ..Default::default()
        },
    );
    let manager = LogStorageManager::new(dir.path(), &LogsConfig::default()).await?;

    manager
        .store_log_entry(LogEntry::new(
            "h1",
            Utc::now(),
            "INFO",
            "api",
            "hybrid entry",
        ))
        .await?;

    let stats = manager.get_storage_stats().await?;
    assert_eq!(stats.backends["file"].total_entries, 1);
    assert_eq!(stats.backends["database"].total_entries, 1);

    let entries = manager
        .retrieve_log_entries(&EntryFilters::default(), 10, 0)
        .await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "h1");
    Ok(())
}
