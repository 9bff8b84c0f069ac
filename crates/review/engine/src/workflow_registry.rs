//! Workflow registry: validated configs and the single active default
//!
//! Configs are validated on registration and never edited afterwards; only
//! their status moves. At most one active default config exists per
//! (request type, scope), checked whenever a config becomes active.

use review_types::{
    ConfigStatus, ReviewError, ReviewResult, WorkflowConfig, WorkflowConfigId, DEFAULT_SCOPE,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct WorkflowRegistry {
    configs: HashMap<WorkflowConfigId, Arc<WorkflowConfig>>,
    /// Registration order, for stable listings
    order: Vec<WorkflowConfigId>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a config.
    ///
    /// A config registered as an active default must not collide with an
    /// existing one.
    pub fn register(&mut self, config: WorkflowConfig) -> ReviewResult<WorkflowConfigId> {
        config.validate()?;
        if self.configs.contains_key(&config.id) {
            return Err(ReviewError::ConfigValidation(format!(
                "Workflow config '{}' already registered",
                config.id
            )));
        }
        if config.is_active_default() {
            self.ensure_no_active_default(&config)?;
        }

        let id = config.id.clone();
        tracing::info!(
            config_id = %id,
            request_type = %config.request_type,
            status = ?config.status,
            "Workflow config registered"
        );
        self.order.push(id.clone());
        self.configs.insert(id.clone(), Arc::new(config));
        Ok(id)
    }

    pub fn get(&self, id: &WorkflowConfigId) -> ReviewResult<Arc<WorkflowConfig>> {
        self.configs
            .get(id)
            .cloned()
            .ok_or_else(|| ReviewError::WorkflowNotFound(id.clone()))
    }

    /// The active default for a request type in the default scope
    pub fn active_default(&self, request_type: &str) -> ReviewResult<Arc<WorkflowConfig>> {
        self.active_default_in(request_type, DEFAULT_SCOPE)
    }

    pub fn active_default_in(
        &self,
        request_type: &str,
        scope: &str,
    ) -> ReviewResult<Arc<WorkflowConfig>> {
        self.configs
            .values()
            .find(|c| c.request_type == request_type && c.scope == scope && c.is_active_default())
            .cloned()
            .ok_or_else(|| ReviewError::InvalidWorkflow {
                request_type: request_type.to_string(),
            })
    }

    pub fn activate(&mut self, id: &WorkflowConfigId) -> ReviewResult<Arc<WorkflowConfig>> {
        let current = self.get(id)?;
        if current.is_default {
            self.ensure_no_active_default(&current)?;
        }
        tracing::info!(config_id = %id, "Workflow config activated");
        Ok(self.set_status(id, &current, ConfigStatus::Active))
    }

    pub fn deactivate(&mut self, id: &WorkflowConfigId) -> ReviewResult<Arc<WorkflowConfig>> {
        let current = self.get(id)?;
        tracing::info!(config_id = %id, "Workflow config deactivated");
        Ok(self.set_status(id, &current, ConfigStatus::Inactive))
    }

    /// All configs in registration order
    pub fn list(&self) -> Vec<Arc<WorkflowConfig>> {
        self.order
            .iter()
            .filter_map(|id| self.configs.get(id).cloned())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.configs.len()
    }

    fn set_status(
        &mut self,
        id: &WorkflowConfigId,
        current: &WorkflowConfig,
        status: ConfigStatus,
    ) -> Arc<WorkflowConfig> {
        let updated = Arc::new(current.clone().with_status(status));
        self.configs.insert(id.clone(), updated.clone());
        updated
    }

    fn ensure_no_active_default(&self, config: &WorkflowConfig) -> ReviewResult<()> {
        let clash = self.configs.values().find(|c| {
            c.id != config.id
                && c.request_type == config.request_type
                && c.scope == config.scope
                && c.is_active_default()
        });
        match clash {
            Some(existing) => Err(ReviewError::DuplicateActiveDefault {
                request_type: config.request_type.clone(),
                scope: config.scope.clone(),
                existing: existing.id.clone(),
            }),
            None => Ok(()),
        }
    }
}
