//! Engine tunables

use crate::notification_planner::RecipientFields;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a single rule action, webhooks included
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    /// How long a writer waits for the per-entity lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Due date offset when neither entity data nor the step sets one
    #[serde(default = "default_sla_days")]
    pub default_sla_days: u32,

    #[serde(default)]
    pub recipient_fields: RecipientFields,

    /// Members per role, for `role:<name>` recipients
    #[serde(default)]
    pub role_directory: HashMap<String, Vec<String>>,

    /// How long an executed action suppresses its duplicates
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Most idempotency keys kept; the oldest are evicted first
    #[serde(default = "default_idempotency_capacity")]
    pub idempotency_capacity: usize,
}

fn default_action_timeout_ms() -> u64 {
    5_000
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_sla_days() -> u32 {
    5
}

fn default_idempotency_ttl_secs() -> u64 {
    86_400
}

fn default_idempotency_capacity() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: default_action_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            default_sla_days: default_sla_days(),
            recipient_fields: RecipientFields::default(),
            role_directory: HashMap::new(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            idempotency_capacity: default_idempotency_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }
}
