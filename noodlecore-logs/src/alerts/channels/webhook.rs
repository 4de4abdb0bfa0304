//! Generic webhook channel: POSTs the alert as a flat JSON payload.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{ChannelError, NotificationProvider};
use crate::alerts::model::{Alert, NotificationConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

pub struct WebhookProvider {
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, alert: &Alert, config: &NotificationConfig) -> Result<(), ChannelError> {
        let settings: WebhookSettings = serde_json::from_value(config.config.clone())
            .map_err(|_| ChannelError::NotConfigured("webhook".to_string()))?;

        let payload = json!({
            "alert_id": alert.id,
            "title": alert.title,
            "description": alert.description,
            "severity": alert.severity.as_str(),
            "type": alert.alert_type.as_str(),
            "status": alert.status.as_str(),
            "source": alert.source,
            "timestamp": alert.timestamp.to_rfc3339(),
            "details": alert.details,
            "tags": alert.tags,
        });

        let mut request = self.client.post(&settings.url).json(&payload);
        for (name, value) in &settings.headers {
            request = request.header(name, value);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }

    fn validate_config(&self, config: &Value) -> bool {
        serde_json::from_value::<WebhookSettings>(config.clone()).is_ok()
    }
}
