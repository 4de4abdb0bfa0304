//! Alert data model: value types shared by the manager, rule engine, and
//! notification channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Category of the detected condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Performance,
    Security,
    System,
    Application,
    AiProvider,
    Sandbox,
    Custom,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Performance => "performance",
            AlertType::Security => "security",
            AlertType::System => "system",
            AlertType::Application => "application",
            AlertType::AiProvider => "ai_provider",
            AlertType::Sandbox => "sandbox",
            AlertType::Custom => "custom",
        }
    }
}

/// Alert lifecycle state.
///
/// `Resolved` is terminal; resolving removes the alert from the active set.
/// `Suppressed` alerts stay in the active set (deduplication still applies)
/// but are skipped by notification and escalation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Suppressed => "suppressed",
        }
    }
}

/// Notification delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
    Chat,
    Console,
    Log,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Chat => "chat",
            ChannelKind::Console => "console",
            ChannelKind::Log => "log",
        }
    }
}

/// Persistent record of a detected condition requiring attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Deterministic hash of (title, source, details); the dedup key.
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub alert_type: AlertType,
    pub status: AlertStatus,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub details: Map<String, Value>,
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub escalation_level: u32,
    #[serde(default)]
    pub notification_sent: bool,
}

/// Compute the dedup key for an alert: the first 16 hex chars of the
/// SHA-256 over `title:source:canonical-JSON(details)`.
pub fn dedup_id(title: &str, source: &str, details: &Map<String, Value>) -> String {
    // serde_json's default map is BTree-backed, so serialization is already
    // canonical (sorted keys, compact separators).
    let canonical = Value::Object(details.clone()).to_string();
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b":");
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Rule matched against incoming alerts to gate notification dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule name; identity is immutable once added.
    pub name: String,
    pub alert_type: AlertType,
    /// Free-form condition string, interpreted by external monitors.
    pub condition: String,
    pub severity: AlertSeverity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between repeated notifications for the same alert id.
    #[serde(default = "default_cooldown")]
    pub cooldown_period: i64,
    /// Burst backpressure: created events per alert id in the trailing hour.
    #[serde(default = "default_max_per_hour")]
    pub max_alerts_per_hour: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_policy: Option<String>,
    #[serde(default)]
    pub notification_channels: Vec<ChannelKind>,
}

fn default_true() -> bool {
    true
}

fn default_cooldown() -> i64 {
    300
}

fn default_max_per_hour() -> usize {
    10
}

/// Per-channel notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub channel_type: ChannelKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Channel-specific settings; each provider deserializes its own shape.
    #[serde(default)]
    pub config: Value,
    /// Maximum sends per sliding 60-second window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Transport-failure retries per send attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Seconds between retries.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

fn default_rate_limit() -> usize {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

impl NotificationConfig {
    pub fn new(channel_type: ChannelKind) -> Self {
        Self {
            channel_type,
            enabled: true,
            config: Value::Object(Map::new()),
            rate_limit: default_rate_limit(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Declared time range during which new alert creation is suppressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

impl MaintenanceWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }
}

/// Action recorded in the alert history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Acknowledged,
    Resolved,
    Escalated,
    NotificationSent,
    Suppressed,
    Unsuppressed,
}

/// Ordered history record of an action taken on an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub action: HistoryAction,
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl HistoryRecord {
    pub fn new(action: HistoryAction, alert_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            action,
            alert_id: alert_id.to_string(),
            timestamp,
            channel: None,
            success: None,
            escalation_level: None,
            acknowledged_by: None,
            resolved_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedup_id_is_deterministic() {
        let mut details = Map::new();
        details.insert("cpu".to_string(), json!(0.95));
        details.insert("host".to_string(), json!("host-1"));

        let a = dedup_id("CPU high", "host-1", &details);
        let b = dedup_id("CPU high", "host-1", &details);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = dedup_id("CPU high", "host-2", &details);
        assert_ne!(a, c);
    }

    #[test]
    fn dedup_id_ignores_detail_insertion_order() {
        let mut first = Map::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));

        let mut second = Map::new();
        second.insert("b".to_string(), json!(2));
        second.insert("a".to_string(), json!(1));

        assert_eq!(
            dedup_id("t", "s", &first),
            dedup_id("t", "s", &second)
        );
    }

    #[test]
    fn severity_ordering() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::Medium < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }

    #[test]
    fn enums_serialize_as_string_values() {
        assert_eq!(
            serde_json::to_string(&AlertType::AiProvider).unwrap(),
            "\"ai_provider\""
        );
        assert_eq!(
            serde_json::to_string(&AlertSeverity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&AlertStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(serde_json::to_string(&ChannelKind::Chat).unwrap(), "\"chat\"");
    }
}
