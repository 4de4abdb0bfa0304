//! Rule engine: built-in rule seed and the notification gate.

use chrono::{DateTime, Duration, Utc};

use super::model::{
    AlertRule, AlertSeverity, AlertType, ChannelKind, HistoryAction, HistoryRecord,
};

/// The standard rule set seeded when no `alert_rules.json` exists.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            name: "high_error_rate".to_string(),
            alert_type: AlertType::Application,
            condition: "error_rate > 0.1".to_string(),
            severity: AlertSeverity::High,
            enabled: true,
            cooldown_period: 300,
            max_alerts_per_hour: 10,
            escalation_policy: None,
            notification_channels: vec![ChannelKind::Email, ChannelKind::Console],
        },
        AlertRule {
            name: "performance_degradation".to_string(),
            alert_type: AlertType::Performance,
            condition: "response_time > 1.0".to_string(),
            severity: AlertSeverity::Medium,
            enabled: true,
            cooldown_period: 300,
            max_alerts_per_hour: 10,
            escalation_policy: None,
            notification_channels: vec![ChannelKind::Console],
        },
        AlertRule {
            name: "security_breach".to_string(),
            alert_type: AlertType::Security,
            condition: "security_event == true".to_string(),
            severity: AlertSeverity::Critical,
            enabled: true,
            cooldown_period: 300,
            max_alerts_per_hour: 10,
            escalation_policy: None,
            notification_channels: vec![ChannelKind::Email, ChannelKind::Chat, ChannelKind::Console],
        },
        AlertRule {
            name: "system_resource_exhaustion".to_string(),
            alert_type: AlertType::System,
            condition: "memory_usage > 0.9 or cpu_usage > 0.9".to_string(),
            severity: AlertSeverity::High,
            enabled: true,
            cooldown_period: 300,
            max_alerts_per_hour: 10,
            escalation_policy: None,
            notification_channels: vec![ChannelKind::Email, ChannelKind::Console],
        },
        AlertRule {
            name: "ai_provider_failure".to_string(),
            alert_type: AlertType::AiProvider,
            condition: "ai_error_rate > 0.2".to_string(),
            severity: AlertSeverity::Medium,
            enabled: true,
            cooldown_period: 300,
            max_alerts_per_hour: 10,
            escalation_policy: None,
            notification_channels: vec![ChannelKind::Console],
        },
    ]
}

/// Notification gate for one alert against one rule.
///
/// Returns false when a notification for this alert id was already sent
/// within the rule's cooldown period, or when the alert id has hit the
/// per-hour creation burst cap.
pub fn should_notify(
    alert_id: &str,
    rule: &AlertRule,
    history: &[HistoryRecord],
    now: DateTime<Utc>,
) -> bool {
    if rule.cooldown_period > 0 {
        let in_cooldown = history.iter().any(|h| {
            h.action == HistoryAction::NotificationSent
                && h.alert_id == alert_id
                && (now - h.timestamp).num_seconds() < rule.cooldown_period
        });
        if in_cooldown {
            return false;
        }
    }

    if rule.max_alerts_per_hour > 0 {
        let hour_ago = now - Duration::hours(1);
        let recent_creates = history
            .iter()
            .filter(|h| {
                h.action == HistoryAction::Created
                    && h.alert_id == alert_id
                    && h.timestamp > hour_ago
            })
            .count();
        if recent_creates >= rule.max_alerts_per_hour {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> AlertRule {
        AlertRule {
            name: "test".to_string(),
            alert_type: AlertType::System,
            condition: String::new(),
            severity: AlertSeverity::High,
            enabled: true,
            cooldown_period: 300,
            max_alerts_per_hour: 3,
            escalation_policy: None,
            notification_channels: vec![ChannelKind::Console],
        }
    }

    #[test]
    fn cooldown_blocks_repeat_notification() {
        let now = Utc::now();
        let mut sent = HistoryRecord::new(HistoryAction::NotificationSent, "a1", now);
        sent.channel = Some(ChannelKind::Console);
        sent.success = Some(true);

        // A send 10s ago is inside the 300s cooldown.
        let mut recent = sent.clone();
        recent.timestamp = now - Duration::seconds(10);
        assert!(!should_notify("a1", &rule(), &[recent], now));

        // A send beyond the cooldown no longer gates.
        let mut old = sent;
        old.timestamp = now - Duration::seconds(600);
        assert!(should_notify("a1", &rule(), &[old], now));
    }

    #[test]
    fn cooldown_ignores_other_alert_ids() {
        let now = Utc::now();
        let mut other = HistoryRecord::new(HistoryAction::NotificationSent, "other", now);
        other.timestamp = now - Duration::seconds(10);
        assert!(should_notify("a1", &rule(), &[other], now));
    }

    #[test]
    fn burst_cap_blocks_after_max_creates() {
        let now = Utc::now();
        let creates: Vec<_> = (0..3)
            .map(|i| {
                let mut h = HistoryRecord::new(HistoryAction::Created, "a1", now);
                h.timestamp = now - Duration::minutes(i + 1);
                h
            })
            .collect();
        assert!(!should_notify("a1", &rule(), &creates, now));

        // Only two within the hour: below the cap of three.
        let mut spread = creates;
        spread[2].timestamp = now - Duration::hours(2);
        assert!(should_notify("a1", &rule(), &spread, now));
    }

    #[test]
    fn default_rules_cover_standard_conditions() {
        let rules = default_rules();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| r.enabled));
        assert!(rules.iter().any(|r| r.name == "security_breach"
            && r.severity == AlertSeverity::Critical
            && r.notification_channels.contains(&ChannelKind::Chat)));
    }
}
