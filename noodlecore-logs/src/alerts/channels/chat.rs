//! Chat channel: posts a severity-colored attachment to a chat webhook.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChannelError, NotificationProvider};
use crate::alerts::model::{Alert, AlertSeverity, NotificationConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    pub webhook_url: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    attachments: Vec<ChatAttachment>,
}

#[derive(Debug, Serialize)]
struct ChatAttachment {
    color: &'static str,
    title: String,
    text: String,
    fields: Vec<ChatField>,
    footer: &'static str,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct ChatField {
    title: &'static str,
    value: String,
    short: bool,
}

fn severity_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Low => "good",
        AlertSeverity::Medium => "warning",
        AlertSeverity::High | AlertSeverity::Critical => "danger",
    }
}

pub struct ChatProvider {
    client: reqwest::Client,
}

impl ChatProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationProvider for ChatProvider {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn send(&self, alert: &Alert, config: &NotificationConfig) -> Result<(), ChannelError> {
        let settings: ChatSettings = serde_json::from_value(config.config.clone())
            .map_err(|_| ChannelError::NotConfigured("chat".to_string()))?;

        let message = ChatMessage {
            attachments: vec![ChatAttachment {
                color: severity_color(alert.severity),
                title: format!("NoodleCore Alert: {}", alert.title),
                text: alert.description.clone(),
                fields: vec![
                    ChatField {
                        title: "Severity",
                        value: alert.severity.as_str().to_uppercase(),
                        short: true,
                    },
                    ChatField {
                        title: "Type",
                        value: alert.alert_type.as_str().to_string(),
                        short: true,
                    },
                    ChatField {
                        title: "Status",
                        value: alert.status.as_str().to_string(),
                        short: true,
                    },
                    ChatField {
                        title: "Source",
                        value: alert.source.clone(),
                        short: true,
                    },
                    ChatField {
                        title: "Time",
                        value: alert.timestamp.to_rfc3339(),
                        short: false,
                    },
                ],
                footer: "NoodleCore",
                ts: alert.timestamp.timestamp(),
            }],
        };

        self.client
            .post(&settings.webhook_url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn validate_config(&self, config: &Value) -> bool {
        serde_json::from_value::<ChatSettings>(config.clone()).is_ok()
    }
}
