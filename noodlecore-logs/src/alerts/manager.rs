//! Alert manager: creation, deduplication, lifecycle, notification
//! processing, escalation, and JSON persistence.
//!
//! One `AlertManager` owns the active-alert map, rule table, channel
//! configs, and history. A single background task (started explicitly,
//! stopped with a final state flush) runs the processing passes; all other
//! access goes through the internal async mutex.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channels::NotificationDispatcher;
use super::model::{
    dedup_id, Alert, AlertRule, AlertSeverity, AlertStatus, AlertType, ChannelKind, HistoryAction,
    HistoryRecord, MaintenanceWindow, NotificationConfig,
};
use super::rules::{default_rules, should_notify};
use crate::config::LogsConfig;
use crate::error::AlertError;
use crate::persist::{read_json, write_json};

/// Tunable knobs for the processing loop.
#[derive(Debug, Clone)]
pub struct AlertManagerOptions {
    /// Interval between processing passes.
    pub process_interval: Duration,
    /// Seconds an alert must stay unresolved before each escalation step.
    pub escalation_interval_secs: i64,
    /// History records older than this many days are pruned each pass.
    pub history_retention_days: i64,
    /// Hard cap on retained history records.
    pub history_max_records: usize,
}

impl Default for AlertManagerOptions {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(30),
            escalation_interval_secs: 1800,
            history_retention_days: 7,
            history_max_records: 10_000,
        }
    }
}

#[derive(Debug, Default)]
struct AlertCounters {
    total_alerts: u64,
    by_severity: BTreeMap<String, u64>,
    by_type: BTreeMap<String, u64>,
}

struct AlertState {
    active_alerts: HashMap<String, Alert>,
    alert_rules: HashMap<String, AlertRule>,
    notification_configs: HashMap<ChannelKind, NotificationConfig>,
    alert_history: Vec<HistoryRecord>,
    maintenance_windows: Vec<MaintenanceWindow>,
    counters: AlertCounters,
}

impl AlertState {
    fn in_maintenance_window(&self, now: DateTime<Utc>) -> bool {
        self.maintenance_windows.iter().any(|w| w.contains(now))
    }
}

/// Snapshot of manager statistics; attempts, not guaranteed delivery.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatistics {
    pub running: bool,
    pub total_alerts: u64,
    pub active_alerts: usize,
    pub alerts_by_severity: BTreeMap<String, u64>,
    pub alerts_by_type: BTreeMap<String, u64>,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub uptime_seconds: i64,
    pub start_time: DateTime<Utc>,
    pub alert_rules: usize,
    pub notification_configs: usize,
    pub maintenance_windows: usize,
}

pub struct AlertManager {
    alerts_file: PathBuf,
    rules_file: PathBuf,
    history_file: PathBuf,
    notifications_file: PathBuf,
    options: AlertManagerOptions,
    state: Mutex<AlertState>,
    dispatcher: NotificationDispatcher,
    running: AtomicBool,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
    start_time: DateTime<Utc>,
}

impl AlertManager {
    /// Create a manager rooted at `config_dir`, seeding built-in rules and
    /// always-on console/log channels when no persisted files exist.
    pub async fn new(
        config_dir: impl Into<PathBuf>,
        config: &LogsConfig,
    ) -> Result<Self, AlertError> {
        Self::with_options(config_dir, config, AlertManagerOptions::default()).await
    }

    pub async fn with_options(
        config_dir: impl Into<PathBuf>,
        config: &LogsConfig,
        options: AlertManagerOptions,
    ) -> Result<Self, AlertError> {
        let config_dir = config_dir.into();
        tokio::fs::create_dir_all(&config_dir)
            .await
            .map_err(|e| AlertError::Init(format!("cannot create {}: {e}", config_dir.display())))?;

        let manager = Self {
            alerts_file: config_dir.join("alerts.json"),
            rules_file: config_dir.join("alert_rules.json"),
            history_file: config_dir.join("alert_history.json"),
            notifications_file: config_dir.join("notifications.json"),
            options,
            state: Mutex::new(AlertState {
                active_alerts: HashMap::new(),
                alert_rules: HashMap::new(),
                notification_configs: HashMap::new(),
                alert_history: Vec::new(),
                maintenance_windows: Vec::new(),
                counters: AlertCounters::default(),
            }),
            dispatcher: NotificationDispatcher::new(),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            task: Mutex::new(None),
            start_time: Utc::now(),
        };

        manager.load_state(config).await?;
        Ok(manager)
    }

    async fn load_state(&self, config: &LogsConfig) -> Result<(), AlertError> {
        let mut state = self.state.lock().await;

        // Rules: persisted file wins, built-in defaults otherwise.
        match read_json::<Vec<AlertRule>>(&self.rules_file).await {
            Some(rules) => {
                for rule in rules {
                    state.alert_rules.insert(rule.name.clone(), rule);
                }
            }
            None => {
                for rule in default_rules() {
                    state.alert_rules.insert(rule.name.clone(), rule);
                }
                let rules: Vec<_> = state.alert_rules.values().cloned().collect();
                write_json(&self.rules_file, &rules).await;
            }
        }

        // Notification configs: console and log are always on; email and
        // chat appear when the environment provides their settings.
        match read_json::<HashMap<ChannelKind, NotificationConfig>>(&self.notifications_file).await
        {
            Some(configs) => state.notification_configs = configs,
            None => {
                state
                    .notification_configs
                    .insert(ChannelKind::Console, NotificationConfig::new(ChannelKind::Console));
                state
                    .notification_configs
                    .insert(ChannelKind::Log, NotificationConfig::new(ChannelKind::Log));

                if !config.smtp.to.is_empty() {
                    let email_config = serde_json::to_value(&config.smtp)
                        .map_err(|e| AlertError::ChannelConfig(e.to_string()))?;
                    state.notification_configs.insert(
                        ChannelKind::Email,
                        NotificationConfig::new(ChannelKind::Email).with_config(email_config),
                    );
                }
                if let Some(webhook_url) = &config.chat_webhook {
                    state.notification_configs.insert(
                        ChannelKind::Chat,
                        NotificationConfig::new(ChannelKind::Chat)
                            .with_config(serde_json::json!({ "webhook_url": webhook_url })),
                    );
                }
                write_json(&self.notifications_file, &state.notification_configs).await;
            }
        }

        // Unresolved alerts survive restarts.
        if let Some(alerts) = read_json::<Vec<Alert>>(&self.alerts_file).await {
            for alert in alerts {
                if alert.status != AlertStatus::Resolved {
                    state.active_alerts.insert(alert.id.clone(), alert);
                }
            }
        }
        if let Some(history) = read_json::<Vec<HistoryRecord>>(&self.history_file).await {
            state.alert_history = history;
        }

        info!(
            alerts = state.active_alerts.len(),
            rules = state.alert_rules.len(),
            channels = state.notification_configs.len(),
            "alert manager state loaded"
        );
        Ok(())
    }

    /// Create a new alert, or merge into the existing ACTIVE alert with the
    /// same dedup id.
    ///
    /// Returns `None` when the current time falls inside a maintenance
    /// window (nothing is recorded). A duplicate with strictly higher
    /// severity updates the existing alert in place; otherwise the existing
    /// alert is returned unchanged.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_alert(
        &self,
        title: &str,
        description: &str,
        severity: AlertSeverity,
        alert_type: AlertType,
        source: &str,
        details: Option<Map<String, Value>>,
        tags: Option<BTreeMap<String, String>>,
    ) -> Result<Option<Alert>, AlertError> {
        let details = details.unwrap_or_default();
        let tags = tags.unwrap_or_default();
        let id = dedup_id(title, source, &details);
        let now = Utc::now();

        let mut state = self.state.lock().await;

        if let Some(existing) = state.active_alerts.get_mut(&id) {
            if severity > existing.severity {
                existing.severity = severity;
                existing.timestamp = now;
                existing.details.extend(details);
                let merged = existing.clone();
                drop(state);
                self.persist_alerts().await?;
                return Ok(Some(merged));
            }
            return Ok(Some(existing.clone()));
        }

        if state.in_maintenance_window(now) {
            debug!(alert_id = %id, "alert suppressed by maintenance window");
            return Ok(None);
        }

        let alert = Alert {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            severity,
            alert_type,
            status: AlertStatus::Active,
            source: source.to_string(),
            timestamp: now,
            details,
            tags,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            escalation_level: 0,
            notification_sent: false,
        };

        state.active_alerts.insert(id.clone(), alert.clone());
        state.counters.total_alerts += 1;
        *state
            .counters
            .by_severity
            .entry(severity.as_str().to_string())
            .or_default() += 1;
        *state
            .counters
            .by_type
            .entry(alert_type.as_str().to_string())
            .or_default() += 1;
        state
            .alert_history
            .push(HistoryRecord::new(HistoryAction::Created, &id, now));
        drop(state);

        self.persist_alerts().await?;
        Ok(Some(alert))
    }

    /// Acknowledge an ACTIVE alert. False when the id is unknown.
    pub async fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> bool {
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            let Some(alert) = state.active_alerts.get_mut(alert_id) else {
                return false;
            };
            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_by = Some(acknowledged_by.to_string());
            alert.acknowledged_at = Some(now);

            let mut record = HistoryRecord::new(HistoryAction::Acknowledged, alert_id, now);
            record.acknowledged_by = Some(acknowledged_by.to_string());
            state.alert_history.push(record);
        }
        if let Err(e) = self.persist_alerts().await {
            warn!(error = %e, "acknowledge persisted in memory only");
        }
        true
    }

    /// Resolve an alert and remove it from the active set. False when the
    /// id is unknown.
    pub async fn resolve_alert(&self, alert_id: &str, resolved_by: &str) -> bool {
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            let Some(mut alert) = state.active_alerts.remove(alert_id) else {
                return false;
            };
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(now);

            let mut record = HistoryRecord::new(HistoryAction::Resolved, alert_id, now);
            record.resolved_by = Some(resolved_by.to_string());
            state.alert_history.push(record);
        }
        if let Err(e) = self.persist_alerts().await {
            warn!(error = %e, "resolve persisted in memory only");
        }
        true
    }

    /// Suppress an ACTIVE alert: it stays in the active set (deduplication
    /// still applies) but notification and escalation passes skip it.
    pub async fn suppress_alert(&self, alert_id: &str) -> bool {
        self.set_suppression(alert_id, true).await
    }

    /// Return a SUPPRESSED alert to ACTIVE.
    pub async fn unsuppress_alert(&self, alert_id: &str) -> bool {
        self.set_suppression(alert_id, false).await
    }

    async fn set_suppression(&self, alert_id: &str, suppress: bool) -> bool {
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            let Some(alert) = state.active_alerts.get_mut(alert_id) else {
                return false;
            };
            let (from, to, action) = if suppress {
                (AlertStatus::Active, AlertStatus::Suppressed, HistoryAction::Suppressed)
            } else {
                (AlertStatus::Suppressed, AlertStatus::Active, HistoryAction::Unsuppressed)
            };
            if alert.status != from {
                return false;
            }
            alert.status = to;
            state
                .alert_history
                .push(HistoryRecord::new(action, alert_id, now));
        }
        if let Err(e) = self.persist_alerts().await {
            warn!(error = %e, "suppression change persisted in memory only");
        }
        true
    }

    pub async fn add_alert_rule(&self, rule: AlertRule) {
        let rules: Vec<AlertRule> = {
            let mut state = self.state.lock().await;
            state.alert_rules.insert(rule.name.clone(), rule);
            state.alert_rules.values().cloned().collect()
        };
        write_json(&self.rules_file, &rules).await;
    }

    pub async fn remove_alert_rule(&self, rule_name: &str) -> bool {
        let (removed, rules) = {
            let mut state = self.state.lock().await;
            let removed = state.alert_rules.remove(rule_name).is_some();
            (removed, state.alert_rules.values().cloned().collect::<Vec<_>>())
        };
        if removed {
            write_json(&self.rules_file, &rules).await;
        }
        removed
    }

    pub async fn add_notification_config(&self, config: NotificationConfig) {
        let configs = {
            let mut state = self.state.lock().await;
            state.notification_configs.insert(config.channel_type, config);
            state.notification_configs.clone()
        };
        write_json(&self.notifications_file, &configs).await;
    }

    /// Declare a window during which new alert creation is suppressed.
    /// Windows are never auto-expired; callers own cleanup.
    pub async fn add_maintenance_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: &str,
    ) {
        let mut state = self.state.lock().await;
        state.maintenance_windows.push(MaintenanceWindow {
            start,
            end,
            description: description.to_string(),
        });
    }

    /// Active alerts, optionally filtered, newest first.
    pub async fn get_active_alerts(
        &self,
        severity: Option<AlertSeverity>,
        alert_type: Option<AlertType>,
        source: Option<&str>,
    ) -> Vec<Alert> {
        let state = self.state.lock().await;
        let mut alerts: Vec<Alert> = state
            .active_alerts
            .values()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .filter(|a| alert_type.map_or(true, |t| a.alert_type == t))
            .filter(|a| source.map_or(true, |s| a.source == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    /// History records, newest first, capped at `limit`.
    pub async fn get_alert_history(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<HistoryRecord> {
        let state = self.state.lock().await;
        let mut history: Vec<HistoryRecord> = state
            .alert_history
            .iter()
            .filter(|h| since.map_or(true, |s| h.timestamp >= s))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(limit);
        history
    }

    pub async fn get_statistics(&self) -> AlertStatistics {
        let state = self.state.lock().await;
        AlertStatistics {
            running: self.running.load(Ordering::Relaxed),
            total_alerts: state.counters.total_alerts,
            active_alerts: state.active_alerts.len(),
            alerts_by_severity: state.counters.by_severity.clone(),
            alerts_by_type: state.counters.by_type.clone(),
            notifications_sent: self.dispatcher.notifications_sent(),
            notifications_failed: self.dispatcher.notifications_failed(),
            uptime_seconds: (Utc::now() - self.start_time).num_seconds(),
            start_time: self.start_time,
            alert_rules: state.alert_rules.len(),
            notification_configs: state.notification_configs.len(),
            maintenance_windows: state.maintenance_windows.len(),
        }
    }

    /// Start the periodic processing task. Idempotent.
    pub async fn start_processing(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.options.process_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; consume it so passes run
            // one interval after start.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.run_processing_pass().await;
                    }
                    _ = manager.shutdown.notified() => break,
                }
            }
        });
        *self.task.lock().await = Some(handle);
        info!("alert processing started");
    }

    /// Stop the processing task, await its completion, and flush state.
    pub async fn stop_processing(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // notify_one stores a permit, so the signal survives even when the
        // task is mid-pass or has not been polled yet.
        self.shutdown.notify_one();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "alert processing task ended abnormally");
            }
        }
        if let Err(e) = self.persist_alerts().await {
            warn!(error = %e, "final alert state flush failed");
        }
        info!("alert processing stopped");
    }

    /// One full processing pass: notifications, escalations, history prune.
    pub async fn run_processing_pass(&self) {
        self.run_notification_pass().await;
        self.run_escalation_pass().await;
        self.run_history_cleanup().await;
    }

    /// Dispatch notifications for ACTIVE alerts that have not been notified
    /// yet. One-shot per alert: escalation never re-triggers this.
    pub async fn run_notification_pass(&self) {
        let now = Utc::now();

        // Collect eligible work under the lock, dispatch outside it.
        let (pending, configs) = {
            let state = self.state.lock().await;
            let mut pending: Vec<(Alert, BTreeSet<ChannelKind>)> = Vec::new();
            for alert in state.active_alerts.values() {
                if alert.status != AlertStatus::Active || alert.notification_sent {
                    continue;
                }
                let mut channels = BTreeSet::new();
                let mut matched = false;
                for rule in state.alert_rules.values() {
                    if rule.enabled
                        && rule.alert_type == alert.alert_type
                        && should_notify(&alert.id, rule, &state.alert_history, now)
                    {
                        matched = true;
                        channels.extend(rule.notification_channels.iter().copied());
                    }
                }
                if matched {
                    pending.push((alert.clone(), channels));
                }
            }
            (pending, state.notification_configs.clone())
        };

        if pending.is_empty() {
            return;
        }

        for (alert, channels) in pending {
            let outcomes = self.dispatcher.dispatch(&alert, &channels, &configs).await;

            let mut state = self.state.lock().await;
            for outcome in &outcomes {
                let mut record =
                    HistoryRecord::new(HistoryAction::NotificationSent, &alert.id, Utc::now());
                record.channel = Some(outcome.channel);
                record.success = Some(outcome.success);
                state.alert_history.push(record);
            }
            if let Some(live) = state.active_alerts.get_mut(&alert.id) {
                live.notification_sent = true;
            }
        }

        if let Err(e) = self.persist_alerts().await {
            warn!(error = %e, "notification pass state flush failed");
        }
    }

    /// Bump the escalation level of ACTIVE alerts that have been unresolved
    /// longer than `(level + 1) * escalation_interval`.
    pub async fn run_escalation_pass(&self) {
        let now = Utc::now();
        let interval = self.options.escalation_interval_secs;
        let mut state = self.state.lock().await;

        let mut escalated = Vec::new();
        for alert in state.active_alerts.values_mut() {
            if alert.status != AlertStatus::Active {
                continue;
            }
            let unresolved_ms = (now - alert.timestamp).num_milliseconds();
            if unresolved_ms > (i64::from(alert.escalation_level) + 1) * interval * 1000 {
                alert.escalation_level += 1;
                escalated.push((alert.id.clone(), alert.escalation_level));
            }
        }
        for (alert_id, level) in escalated {
            debug!(alert_id = %alert_id, level, "alert escalated");
            let mut record = HistoryRecord::new(HistoryAction::Escalated, &alert_id, now);
            record.escalation_level = Some(level);
            state.alert_history.push(record);
        }
    }

    /// Prune history beyond the retention window and the record cap.
    pub async fn run_history_cleanup(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(self.options.history_retention_days);
        let mut state = self.state.lock().await;
        state.alert_history.retain(|h| h.timestamp > cutoff);

        let max = self.options.history_max_records;
        if state.alert_history.len() > max {
            let excess = state.alert_history.len() - max;
            state.alert_history.drain(..excess);
        }
    }

    /// Write active alerts and history to their JSON files.
    async fn persist_alerts(&self) -> Result<(), AlertError> {
        let (alerts, history) = {
            let state = self.state.lock().await;
            let alerts: Vec<Alert> = state.active_alerts.values().cloned().collect();
            (alerts, state.alert_history.clone())
        };

        let alerts_json = serde_json::to_string_pretty(&alerts)
            .map_err(|e| AlertError::Creation(e.to_string()))?;
        tokio::fs::write(&self.alerts_file, alerts_json)
            .await
            .map_err(|e| AlertError::Creation(e.to_string()))?;

        let history_json = serde_json::to_string_pretty(&history)
            .map_err(|e| AlertError::History(e.to_string()))?;
        tokio::fs::write(&self.history_file, history_json)
            .await
            .map_err(|e| AlertError::History(e.to_string()))?;
        Ok(())
    }
}
