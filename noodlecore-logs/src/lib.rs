//! Alerting and log storage for NoodleCore services.
//!
//! Two managers make up the public surface. [`AlertManager`] deduplicates
//! incoming alerts, gates notifications through rules and per-channel rate
//! limits, escalates stale alerts, and persists its state as JSON.
//! [`LogStorageManager`] routes log entries to file and SQLite backends,
//! applies retention policies, and takes periodic backups. Both run an
//! explicit background task that is started and stopped by the caller.

pub mod alerts;
pub mod config;
pub mod error;
mod persist;
pub mod storage;

pub use alerts::{
    Alert, AlertManager, AlertManagerOptions, AlertRule, AlertSeverity, AlertStatistics,
    AlertStatus, AlertType, ChannelKind, NotificationConfig,
};
pub use config::LogsConfig;
pub use error::{AlertError, StorageError};
pub use storage::{
    BackendKind, CompressionKind, EntryFilters, LogEntry, LogStorageManager, ManagerStats,
    RetentionAction, RetentionPolicy, RetentionPolicyKind, StorageConfig, StorageManagerOptions,
};

/// Initialize tracing from `RUST_LOG`. Safe to call when the host
/// application has already installed a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
