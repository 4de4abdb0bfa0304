//! Console channel: emoji-tagged text block on stdout.

use async_trait::async_trait;
use serde_json::Value;

use super::{ChannelError, NotificationProvider};
use crate::alerts::model::{Alert, AlertSeverity, NotificationConfig};

pub struct ConsoleProvider;

fn severity_symbol(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Low => "\u{1F7E2}",      // green circle
        AlertSeverity::Medium => "\u{1F7E1}",   // yellow circle
        AlertSeverity::High => "\u{1F7E0}",     // orange circle
        AlertSeverity::Critical => "\u{1F534}", // red circle
    }
}

#[async_trait]
impl NotificationProvider for ConsoleProvider {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, alert: &Alert, _config: &NotificationConfig) -> Result<(), ChannelError> {
        println!(
            "\n{} NOODLECORE ALERT [{}]",
            severity_symbol(alert.severity),
            alert.severity.as_str().to_uppercase()
        );
        println!("   Title: {}", alert.title);
        println!("   Type: {}", alert.alert_type.as_str());
        println!("   Source: {}", alert.source);
        println!("   Time: {}", alert.timestamp.to_rfc3339());
        println!("   Description: {}", alert.description);
        if !alert.details.is_empty() {
            let details = serde_json::to_string_pretty(&alert.details).unwrap_or_default();
            println!("   Details: {}", details);
        }
        println!();
        Ok(())
    }

    fn validate_config(&self, _config: &Value) -> bool {
        true
    }
}
