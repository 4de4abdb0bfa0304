//! Log channel: structured tracing event with the alert fields as attributes.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{ChannelError, NotificationProvider};
use crate::alerts::model::{Alert, AlertSeverity, NotificationConfig};

pub struct LogProvider;

#[async_trait]
impl NotificationProvider for LogProvider {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, alert: &Alert, _config: &NotificationConfig) -> Result<(), ChannelError> {
        let details = serde_json::to_string(&alert.details).unwrap_or_default();
        let tags = serde_json::to_string(&alert.tags).unwrap_or_default();

        match alert.severity {
            AlertSeverity::Low => info!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                source = %alert.source,
                details = %details,
                tags = %tags,
                "Alert: {} - {}",
                alert.title,
                alert.description
            ),
            AlertSeverity::Medium => warn!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                source = %alert.source,
                details = %details,
                tags = %tags,
                "Alert: {} - {}",
                alert.title,
                alert.description
            ),
            AlertSeverity::High | AlertSeverity::Critical => error!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                source = %alert.source,
                details = %details,
                tags = %tags,
                "Alert: {} - {}",
                alert.title,
                alert.description
            ),
        }

        Ok(())
    }

    fn validate_config(&self, _config: &Value) -> bool {
        true
    }
}
