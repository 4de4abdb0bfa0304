//! Environment-derived configuration for the subsystem.
//!
//! The surrounding application owns real configuration; this module only
//! performs the typed env lookups the alerting and storage managers consume
//! (SMTP credentials, chat webhook, backup toggles).

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// SMTP settings for the email notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

/// Backup schedule settings for the storage maintenance loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    pub enabled: bool,
    pub interval_hours: u64,
    pub backup_dir: Option<String>,
    pub retention_days: i64,
}

/// Typed view over the environment variables this subsystem consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    pub smtp: SmtpSettings,
    pub chat_webhook: Option<String>,
    pub backup: BackupSettings,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            smtp: SmtpSettings {
                smtp_server: "localhost".to_string(),
                smtp_port: 587,
                use_tls: true,
                username: None,
                password: None,
                from: "noodlecore@example.com".to_string(),
                to: vec![],
            },
            chat_webhook: None,
            backup: BackupSettings {
                enabled: false,
                interval_hours: 24,
                backup_dir: None,
                retention_days: 30,
            },
        }
    }
}

impl LogsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(server) = env::var("NOODLE_SMTP_SERVER") {
            config.smtp.smtp_server = server;
        }
        if let Some(port) = env_int("NOODLE_SMTP_PORT").and_then(|p| u16::try_from(p).ok()) {
            config.smtp.smtp_port = port;
        } else if env::var("NOODLE_SMTP_PORT").is_ok() {
            warn!("ignoring NOODLE_SMTP_PORT: not a valid port");
        }
        if let Some(tls) = env_bool("NOODLE_SMTP_TLS") {
            config.smtp.use_tls = tls;
        }
        config.smtp.username = env::var("NOODLE_SMTP_USERNAME").ok();
        config.smtp.password = env::var("NOODLE_SMTP_PASSWORD").ok();
        if let Ok(from) = env::var("NOODLE_ALERT_FROM") {
            config.smtp.from = from;
        }
        if let Ok(to) = env::var("NOODLE_ALERT_TO") {
            config.smtp.to = to
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config.chat_webhook = env::var("NOODLE_CHAT_WEBHOOK").ok();

        if let Some(enabled) = env_bool("NOODLE_BACKUP_ENABLED") {
            config.backup.enabled = enabled;
        }
        if let Some(interval) = env_int("NOODLE_BACKUP_INTERVAL") {
            config.backup.interval_hours = interval.max(1) as u64;
        }
        config.backup.backup_dir = env::var("NOODLE_BACKUP_DIR").ok();
        if let Some(days) = env_int("NOODLE_BACKUP_RETENTION") {
            config.backup.retention_days = days;
        }

        config
    }
}

fn env_int(name: &str) -> Option<i64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
