//! Email notification channel over SMTP.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;

use super::{ChannelError, NotificationProvider};
use crate::alerts::model::{Alert, NotificationConfig};

/// SMTP settings carried in the channel's config object.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    pub smtp_server: String,
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    #[serde(default = "default_tls")]
    pub use_tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

fn default_port() -> u16 {
    587
}

fn default_tls() -> bool {
    true
}

pub struct EmailProvider;

impl EmailProvider {
    pub fn new() -> Self {
        Self
    }

    fn build_transport(
        settings: &EmailSettings,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let mut builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_server)
        };
        builder = builder.port(settings.smtp_port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

impl Default for EmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationProvider for EmailProvider {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert, config: &NotificationConfig) -> Result<(), ChannelError> {
        let settings: EmailSettings = serde_json::from_value(config.config.clone())
            .map_err(|_| ChannelError::NotConfigured("email".to_string()))?;
        if settings.to.is_empty() {
            return Err(ChannelError::NotConfigured(
                "email: no recipients".to_string(),
            ));
        }

        let from: Mailbox = settings.from.parse()?;
        let mut builder = Message::builder()
            .from(from)
            .subject(format!("[NoodleCore Alert] {}", alert.title));
        for recipient in &settings.to {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let email = builder
            .header(ContentType::TEXT_HTML)
            .body(email_body(alert))?;

        let mailer = Self::build_transport(&settings)?;
        mailer.send(email).await?;
        Ok(())
    }

    fn validate_config(&self, config: &Value) -> bool {
        serde_json::from_value::<EmailSettings>(config.clone())
            .map(|s| !s.to.is_empty())
            .unwrap_or(false)
    }
}

/// HTML table of the alert's fields, with details and tags as JSON blocks.
fn email_body(alert: &Alert) -> String {
    let details = serde_json::to_string_pretty(&alert.details).unwrap_or_default();
    let tags = serde_json::to_string_pretty(&alert.tags).unwrap_or_default();

    format!(
        r#"<html>
<body>
    <h2>NoodleCore Alert</h2>
    <table border="1" style="border-collapse: collapse;">
        <tr><td><strong>Title:</strong></td><td>{}</td></tr>
        <tr><td><strong>Severity:</strong></td><td>{}</td></tr>
        <tr><td><strong>Type:</strong></td><td>{}</td></tr>
        <tr><td><strong>Status:</strong></td><td>{}</td></tr>
        <tr><td><strong>Source:</strong></td><td>{}</td></tr>
        <tr><td><strong>Time:</strong></td><td>{}</td></tr>
        <tr><td><strong>Description:</strong></td><td>{}</td></tr>
    </table>

    <h3>Details</h3>
    <pre>{}</pre>

    <h3>Tags</h3>
    <pre>{}</pre>
</body>
</html>"#,
        alert.title,
        alert.severity.as_str().to_uppercase(),
        alert.alert_type.as_str(),
        alert.status.as_str(),
        alert.source,
        alert.timestamp.to_rfc3339(),
        alert.description,
        details,
        tags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_requires_server_from_and_recipients() {
        let provider = EmailProvider::new();
        assert!(provider.validate_config(&json!({
            "smtp_server": "smtp.example.com",
            "from": "alerts@example.com",
            "to": ["ops@example.com"],
        })));
        assert!(!provider.validate_config(&json!({
            "smtp_server": "smtp.example.com",
            "from": "alerts@example.com",
            "to": [],
        })));
        assert!(!provider.validate_config(&json!({ "from": "alerts@example.com" })));
    }
}
