//! Layout catalog: named layouts and the bindings that select them

use review_types::{Layout, LayoutBinding, LayoutKey, ReviewError, ReviewResult};
use std::collections::HashMap;

/// Looks up layouts by id or by stage binding
pub trait LayoutCatalog: Send + Sync {
    fn layout(&self, layout_id: &str) -> Option<&Layout>;

    /// Most specific layout bound to the key
    fn resolve(&self, key: &LayoutKey<'_>) -> Option<&Layout>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLayoutCatalog {
    layouts: HashMap<String, Layout>,
    bindings: Vec<LayoutBinding>,
}

impl InMemoryLayoutCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, layout: Layout) {
        tracing::debug!(layout_id = %layout.id, sections = layout.sections.len(), "Layout registered");
        self.layouts.insert(layout.id.clone(), layout);
    }

    /// Add a binding; the layout must already be registered
    pub fn bind(&mut self, binding: LayoutBinding) -> ReviewResult<()> {
        if !self.layouts.contains_key(&binding.layout_id) {
            return Err(ReviewError::ConfigValidation(format!(
                "Binding for '{}' at '{}' references unknown layout '{}'",
                binding.request_type, binding.workflow_stage, binding.layout_id
            )));
        }
        self.bindings.push(binding);
        Ok(())
    }

    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }
}

impl LayoutCatalog for InMemoryLayoutCatalog {
    fn layout(&self, layout_id: &str) -> Option<&Layout> {
        self.layouts.get(layout_id)
    }

    fn resolve(&self, key: &LayoutKey<'_>) -> Option<&Layout> {
        let mut best: Option<(u8, &LayoutBinding)> = None;
        for binding in &self.bindings {
            if let Some(score) = binding.specificity(key) {
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, binding));
                }
            }
        }
        best.and_then(|(_, b)| self.layouts.get(&b.layout_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_types::LayoutSection;

    fn catalog() -> InMemoryLayoutCatalog {
        let mut catalog = InMemoryLayoutCatalog::new();
        for id in ["agent-base", "agent-review", "agent-broker"] {
            catalog.register(
                Layout::new(id).with_section(LayoutSection::new("main", 1, vec!["name".into()])),
            );
        }
        catalog
            .bind(LayoutBinding::new("agent-base", "agent", "*"))
            .unwrap();
        catalog
            .bind(LayoutBinding::new("agent-review", "agent", "review"))
            .unwrap();
        catalog
            .bind(LayoutBinding::new("agent-broker", "agent", "*").for_agent_type("broker"))
            .unwrap();
        catalog
    }

    fn key<'a>(stage: &'a str, agent_type: Option<&'a str>) -> LayoutKey<'a> {
        LayoutKey {
            request_type: "agent",
            workflow_stage: stage,
            agent_type,
            agent_category: None,
        }
    }

    #[test]
    fn test_resolve_prefers_specific_binding() {
        let c = catalog();
        assert_eq!(c.resolve(&key("review", None)).unwrap().id, "agent-review");
        assert_eq!(c.resolve(&key("approval", None)).unwrap().id, "agent-base");
        assert_eq!(
            c.resolve(&key("review", Some("broker"))).unwrap().id,
            "agent-broker"
        );
    }

    #[test]
    fn test_unbound_request_type() {
        let c = catalog();
        let key = LayoutKey {
            request_type: "vendor",
            workflow_stage: "review",
            agent_type: None,
            agent_category: None,
        };
        assert!(c.resolve(&key).is_none());
    }

    #[test]
    fn test_bind_unknown_layout_rejected() {
        let mut c = catalog();
        assert!(c.bind(LayoutBinding::new("missing", "agent", "*")).is_err());
        assert_eq!(c.bindings().len(), 3);
    }
}
