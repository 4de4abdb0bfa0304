//! Alerting: typed alerts with deduplication, rule-gated notification
//! dispatch across pluggable channels, escalation, and JSON persistence.

pub mod channels;
pub mod manager;
pub mod model;
pub mod rules;

pub use channels::{ChannelError, DispatchOutcome, NotificationDispatcher, NotificationProvider};
pub use manager::{AlertManager, AlertManagerOptions, AlertStatistics};
pub use model::{
    Alert, AlertRule, AlertSeverity, AlertStatus, AlertType, ChannelKind, HistoryAction,
    HistoryRecord, MaintenanceWindow, NotificationConfig,
};
pub use rules::default_rules;
