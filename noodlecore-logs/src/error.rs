//! Error types for the alerting and log storage subsystems.
//!
//! Each subsystem carries one error enum with a variant per failure domain.
//! Every variant maps to a stable numeric code from a reserved range
//! (5501-5510 for alerting, 5601-5610 for storage) so callers and log
//! scrapers can match on codes across releases.

use thiserror::Error;

/// Errors raised by the alert manager and its collaborators.
///
/// Expected negative outcomes (unknown alert id, rate-limited send,
/// maintenance-window suppression) are plain `bool`/`Option` results on the
/// relevant APIs; this type is reserved for I/O and serialization failures.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert manager initialization failed: {0}")]
    Init(String),

    #[error("alert creation failed: {0}")]
    Creation(String),

    #[error("notification dispatch failed: {0}")]
    Notification(String),

    #[error("escalation check failed: {0}")]
    Escalation(String),

    #[error("channel configuration invalid: {0}")]
    ChannelConfig(String),

    #[error("alert scheduling failed: {0}")]
    Scheduling(String),

    #[error("alert deduplication failed: {0}")]
    Deduplication(String),

    #[error("alert history persistence failed: {0}")]
    History(String),

    #[error("alert integration failed: {0}")]
    Integration(String),

    #[error("maintenance mode handling failed: {0}")]
    MaintenanceMode(String),
}

impl AlertError {
    /// Stable numeric code for this failure domain.
    pub fn code(&self) -> u16 {
        match self {
            AlertError::Init(_) => 5501,
            AlertError::Creation(_) => 5502,
            AlertError::Notification(_) => 5503,
            AlertError::Escalation(_) => 5504,
            AlertError::ChannelConfig(_) => 5505,
            AlertError::Scheduling(_) => 5506,
            AlertError::Deduplication(_) => 5507,
            AlertError::History(_) => 5508,
            AlertError::Integration(_) => 5509,
            AlertError::MaintenanceMode(_) => 5510,
        }
    }
}

/// Errors raised by the log storage manager and its backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage initialization failed: {0}")]
    Init(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("archival failed: {0}")]
    Archival(String),

    #[error("retention pass failed: {0}")]
    Retention(String),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("index update failed: {0}")]
    Indexing(String),

    #[error("replication failed: {0}")]
    Replication(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

impl StorageError {
    /// Stable numeric code for this failure domain.
    pub fn code(&self) -> u16 {
        match self {
            StorageError::Init(_) => 5601,
            StorageError::Backend(_) => 5602,
            StorageError::Compression(_) => 5603,
            StorageError::Archival(_) => 5604,
            StorageError::Retention(_) => 5605,
            StorageError::Backup(_) => 5606,
            StorageError::Indexing(_) => 5607,
            StorageError::Replication(_) => 5608,
            StorageError::Encryption(_) => 5609,
            StorageError::Cleanup(_) => 5610,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
