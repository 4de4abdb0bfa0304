//! Named retention policies applied once per maintenance cycle.
//!
//! Three policies are seeded: `default` (mirrors the configured policy),
//! `errors` (ERROR-level entries kept 180 days), and `security` (entries
//! from the security component kept 365 days). Size- and count-based
//! policies use fixed fallback windows rather than computing an exact
//! cutoff, which keeps the pass cheap at the cost of precision.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::model::{RetentionAction, RetentionPolicy, RetentionPolicyKind, StorageConfig};
use super::{EntryFilters, StorageBackend};
use crate::error::StorageError;

/// Fallback deletion window for size-based policies.
const SIZE_FALLBACK_DAYS: i64 = 30;
/// Fallback deletion window for count-based policies.
const COUNT_FALLBACK_DAYS: i64 = 7;

#[derive(Clone)]
pub struct RetentionManager {
    policies: HashMap<String, RetentionPolicy>,
}

impl RetentionManager {
    /// Seed the standard policy set around the configured default.
    pub fn new(config: &StorageConfig) -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            "default".to_string(),
            RetentionPolicy {
                kind: config.retention_policy,
                value: config.retention_value,
                action: RetentionAction::Archive,
            },
        );
        policies.insert(
            "errors".to_string(),
            RetentionPolicy {
                kind: RetentionPolicyKind::TimeBased,
                value: 180,
                action: RetentionAction::Archive,
            },
        );
        policies.insert(
            "security".to_string(),
            RetentionPolicy {
                kind: RetentionPolicyKind::TimeBased,
                value: 365,
                action: RetentionAction::Archive,
            },
        );
        Self { policies }
    }

    pub fn add_policy(&mut self, name: impl Into<String>, policy: RetentionPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Remove a policy by name. The seeded `default` policy cannot be
    /// removed, only replaced via `add_policy`.
    pub fn remove_policy(&mut self, name: &str) -> bool {
        if name == "default" {
            return false;
        }
        self.policies.remove(name).is_some()
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }

    /// Run every policy against every backend. Per-policy failures are
    /// logged and never abort the pass.
    pub async fn apply_policies(
        &self,
        backends: &[Arc<dyn StorageBackend>],
        now: DateTime<Utc>,
    ) -> u64 {
        let mut total_affected = 0;
        for (name, policy) in &self.policies {
            match self.apply_one(name, policy, backends, now).await {
                Ok(affected) => {
                    if affected > 0 {
                        debug!(policy = %name, affected, "retention policy applied");
                    }
                    total_affected += affected;
                }
                Err(e) => warn!(policy = %name, error = %e, "retention policy failed"),
            }
        }
        total_affected
    }

    async fn apply_one(
        &self,
        name: &str,
        policy: &RetentionPolicy,
        backends: &[Arc<dyn StorageBackend>],
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        match policy.kind {
            RetentionPolicyKind::TimeBased => {
                let mut filters =
                    EntryFilters::until(now - ChronoDuration::days(policy.value as i64));
                // Named policies narrow their scope.
                match name {
                    "errors" => filters.level = Some("ERROR".to_string()),
                    "security" => filters.component = Some("security".to_string()),
                    _ => {}
                }
                self.enforce(policy.action, &filters, backends).await
            }
            RetentionPolicyKind::SizeBased => {
                let mut total_bytes = 0;
                for backend in backends {
                    total_bytes += backend.get_stats().await?.total_size_bytes;
                }
                if total_bytes <= policy.value * 1024 * 1024 {
                    return Ok(0);
                }
                let filters = EntryFilters::until(now - ChronoDuration::days(SIZE_FALLBACK_DAYS));
                self.enforce(RetentionAction::Delete, &filters, backends).await
            }
            RetentionPolicyKind::CountBased => {
                let mut total_entries = 0;
                for backend in backends {
                    total_entries += backend.get_stats().await?.total_entries;
                }
                if total_entries <= policy.value as i64 {
                    return Ok(0);
                }
                let filters = EntryFilters::until(now - ChronoDuration::days(COUNT_FALLBACK_DAYS));
                self.enforce(RetentionAction::Delete, &filters, backends).await
            }
            // Custom policies carry no executable rule here.
            RetentionPolicyKind::Custom => Ok(0),
        }
    }

    async fn enforce(
        &self,
        action: RetentionAction,
        filters: &EntryFilters,
        backends: &[Arc<dyn StorageBackend>],
    ) -> Result<u64, StorageError> {
        let mut affected = 0;
        for backend in backends {
            affected += match action {
                RetentionAction::Delete => backend.delete_entries(filters).await?,
                RetentionAction::Archive => backend.archive_entries(filters).await?,
            };
        }
        Ok(affected)
    }
}
