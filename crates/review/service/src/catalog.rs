//! Bootstrap catalog
//!
//! A single JSON document carrying everything the engine needs before the
//! first request: workflow configs, engine-wide rules, layouts with their
//! bindings, field permissions and the role directory.

use crate::error::{ServiceError, ServiceResult};
use review_engine::{
    EngineConfig, InMemoryLayoutCatalog, ReviewOrchestrator, StaticPermissionResolver,
    WorkflowRegistry,
};
use review_types::{Layout, LayoutBinding, PermissionRule, Rule, WorkflowConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub layouts: Vec<Layout>,
    #[serde(default)]
    pub layout_bindings: Vec<LayoutBinding>,
    #[serde(default)]
    pub permission_rules: Vec<PermissionRule>,
    /// Role name to member addresses
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
}

impl Catalog {
    pub fn from_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| ServiceError::Catalog(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> ServiceResult<Self> {
        serde_json::from_str(raw).map_err(|e| ServiceError::Catalog(e.to_string()))
    }

    /// Validate everything and assemble an orchestrator around it
    pub async fn build(self, mut engine: EngineConfig) -> ServiceResult<ReviewOrchestrator> {
        let mut layouts = InMemoryLayoutCatalog::new();
        for layout in self.layouts {
            layouts.register(layout);
        }
        for binding in self.layout_bindings {
            layouts.bind(binding)?;
        }

        let mut registry = WorkflowRegistry::new();
        for workflow in self.workflows {
            registry.register(workflow)?;
        }

        engine.role_directory.extend(self.roles);

        tracing::info!(
            workflows = registry.count(),
            rules = self.rules.len(),
            layouts = layouts.layout_count(),
            bindings = layouts.bindings().len(),
            permission_rules = self.permission_rules.len(),
            "Catalog loaded"
        );

        let orchestrator = ReviewOrchestrator::builder(engine)
            .with_registry(registry)
            .with_catalog(Arc::new(layouts))
            .with_permissions(Arc::new(StaticPermissionResolver::new(self.permission_rules)))
            .build();
        for rule in self.rules {
            orchestrator.add_rule(rule).await?;
        }
        Ok(orchestrator)
    }
}
