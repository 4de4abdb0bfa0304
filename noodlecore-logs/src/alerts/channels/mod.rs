//! Notification channel implementations.
//!
//! Each channel implements [`NotificationProvider`]; the
//! [`NotificationDispatcher`] owns one provider per channel kind and applies
//! rate limiting and retry policy around them. One channel failing never
//! blocks the others.

pub mod chat;
pub mod console;
pub mod email;
pub mod log;
pub mod webhook;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::model::{Alert, ChannelKind, NotificationConfig};

/// Errors that can occur while sending through a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP transport failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("email message invalid: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("email address invalid: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

/// Trait for notification channels (email, webhook, chat, console, log).
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Name of this channel, for logging and history.
    fn name(&self) -> &'static str;

    /// Deliver one alert through this channel.
    async fn send(&self, alert: &Alert, config: &NotificationConfig) -> Result<(), ChannelError>;

    /// Check that the channel-specific config object is usable.
    fn validate_config(&self, config: &Value) -> bool;
}

/// Outcome of one delivery attempt, recorded in alert history.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOutcome {
    pub channel: ChannelKind,
    pub success: bool,
}

/// Per-channel sliding-window rate limiter plus provider registry.
pub struct NotificationDispatcher {
    providers: HashMap<ChannelKind, Box<dyn NotificationProvider>>,
    windows: Mutex<HashMap<ChannelKind, VecDeque<Instant>>>,
    sent: AtomicU64,
    failed: AtomicU64,
}

const RATE_WINDOW: Duration = Duration::from_secs(60);

impl NotificationDispatcher {
    /// Build a dispatcher with the five standard providers sharing one
    /// HTTP client (30s timeout, matching each transport's own limit).
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let mut dispatcher = Self {
            providers: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        };
        dispatcher.register(ChannelKind::Email, Box::new(email::EmailProvider::new()));
        dispatcher.register(
            ChannelKind::Webhook,
            Box::new(webhook::WebhookProvider::new(http.clone())),
        );
        dispatcher.register(ChannelKind::Chat, Box::new(chat::ChatProvider::new(http)));
        dispatcher.register(ChannelKind::Console, Box::new(console::ConsoleProvider));
        dispatcher.register(ChannelKind::Log, Box::new(log::LogProvider));
        dispatcher
    }

    /// Replace or add a provider for a channel kind.
    pub fn register(&mut self, kind: ChannelKind, provider: Box<dyn NotificationProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn notifications_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn notifications_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Send one alert over a set of channels, one attempt per channel.
    ///
    /// Disabled or unconfigured channels are skipped silently; rate-limited
    /// sends are recorded as failures without retry; transport failures are
    /// retried per the channel's retry policy. Returns one outcome per
    /// attempted channel.
    pub async fn dispatch(
        &self,
        alert: &Alert,
        channels: &BTreeSet<ChannelKind>,
        configs: &HashMap<ChannelKind, NotificationConfig>,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();

        for channel in channels {
            let Some(config) = configs.get(channel) else {
                debug!(channel = channel.as_str(), "channel has no config, skipping");
                continue;
            };
            if !config.enabled {
                debug!(channel = channel.as_str(), "channel disabled, skipping");
                continue;
            }
            let Some(provider) = self.providers.get(channel) else {
                continue;
            };

            if !self.try_acquire(*channel, config.rate_limit) {
                warn!(
                    channel = channel.as_str(),
                    alert_id = %alert.id,
                    rate_limit = config.rate_limit,
                    "channel rate limit hit, dropping notification"
                );
                self.failed.fetch_add(1, Ordering::Relaxed);
                outcomes.push(DispatchOutcome {
                    channel: *channel,
                    success: false,
                });
                continue;
            }

            let success = self.send_with_retry(provider.as_ref(), alert, config).await;
            if success {
                self.sent.fetch_add(1, Ordering::Relaxed);
            } else {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            outcomes.push(DispatchOutcome {
                channel: *channel,
                success,
            });
        }

        outcomes
    }

    async fn send_with_retry(
        &self,
        provider: &dyn NotificationProvider,
        alert: &Alert,
        config: &NotificationConfig,
    ) -> bool {
        let mut attempt = 0u32;
        loop {
            match provider.send(alert, config).await {
                Ok(()) => {
                    debug!(
                        channel = provider.name(),
                        alert_id = %alert.id,
                        "notification sent"
                    );
                    return true;
                }
                Err(err) => {
                    warn!(
                        channel = provider.name(),
                        alert_id = %alert.id,
                        attempt,
                        error = %err,
                        "notification send failed"
                    );
                    if attempt >= config.retry_attempts {
                        return false;
                    }
                    attempt += 1;
                    tokio::time::sleep(Duration::from_secs(config.retry_delay)).await;
                }
            }
        }
    }

    /// Reserve one slot in the channel's sliding 60-second window.
    fn try_acquire(&self, channel: ChannelKind, limit: usize) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry(channel).or_default();

        while let Some(front) = window.front() {
            if now.duration_since(*front) >= RATE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit {
            return false;
        }
        window.push_back(now);
        true
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
