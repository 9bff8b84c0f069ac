//! View structure generator
//!
//! Composes the layout catalog and the permission resolver into the tabs,
//! sections and fields a viewer role sees at a stage. Generation reads
//! configuration only and never mutates state, so previews can call it
//! freely.

use crate::{LayoutCatalog, PermissionResolver};
use review_types::{
    Layout, LayoutKey, ReviewError, ReviewResult, StageSettings, ViewField, ViewRequest,
    ViewSection, ViewStructure, ViewTab,
};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct ViewStructureGenerator {
    catalog: Arc<dyn LayoutCatalog>,
    permissions: Arc<dyn PermissionResolver>,
}

impl ViewStructureGenerator {
    pub fn new(catalog: Arc<dyn LayoutCatalog>, permissions: Arc<dyn PermissionResolver>) -> Self {
        Self {
            catalog,
            permissions,
        }
    }

    /// Generate the view for a request.
    ///
    /// `default_role` is used when the request names no viewer role.
    /// Fails with `LayoutNotFound` when neither the stage override nor the
    /// catalog yields a layout; permission lookup failures only hide the
    /// field and add a warning.
    pub fn generate(
        &self,
        request: &ViewRequest,
        settings: Option<&StageSettings>,
        default_role: Option<&str>,
    ) -> ReviewResult<ViewStructure> {
        let mut warnings = Vec::new();
        let layout = self.select_layout(request, settings, &mut warnings)?;
        let role = request
            .viewer_role
            .as_deref()
            .or(default_role)
            .unwrap_or_default();

        let allow: Option<HashSet<&str>> = settings
            .filter(|s| !s.visible_fields.is_empty())
            .map(|s| s.visible_fields.iter().map(String::as_str).collect());

        let mut ordered: Vec<_> = layout.sections.iter().enumerate().collect();
        ordered.sort_by_key(|(idx, s)| (s.order, *idx));

        let mut seen = HashSet::new();
        let mut sections = Vec::new();
        for (_, section) in ordered {
            let mut fields = Vec::new();
            for field in &section.fields {
                if seen.contains(field.as_str()) {
                    continue;
                }
                let permission = match self
                    .permissions
                    .resolve(&request.entity_name, field, role)
                {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::warn!(field = %field, role = %role, error = %err, "Permission lookup failed");
                        warnings.push(err.to_string());
                        continue;
                    }
                };
                if !permission.can_view {
                    continue;
                }
                if let Some(allow) = &allow {
                    if !allow.contains(field.as_str()) {
                        continue;
                    }
                }
                seen.insert(field.as_str());
                fields.push(ViewField {
                    name: field.clone(),
                    section: section.id.clone(),
                    can_edit: permission.can_edit,
                });
            }
            if fields.is_empty() {
                continue;
            }
            sections.push(ViewSection {
                id: section.id.clone(),
                title: section.title.clone(),
                tab: section.tab.clone(),
                order: sections.len() as u32 + 1,
                fields,
            });
        }

        let used_tabs: HashSet<&str> = sections.iter().filter_map(|s| s.tab.as_deref()).collect();
        let mut tabs: Vec<_> = layout
            .tabs
            .iter()
            .enumerate()
            .filter(|(_, t)| used_tabs.contains(t.id.as_str()))
            .collect();
        tabs.sort_by_key(|(idx, t)| (t.order, *idx));
        let tabs = tabs
            .into_iter()
            .enumerate()
            .map(|(i, (_, t))| ViewTab {
                id: t.id.clone(),
                title: t.title.clone(),
                order: i as u32 + 1,
            })
            .collect();

        let fields = sections.iter().flat_map(|s| s.fields.clone()).collect();

        Ok(ViewStructure {
            layout_id: Some(layout.id.clone()),
            tabs,
            sections,
            fields,
            warnings,
        })
    }

    fn select_layout(
        &self,
        request: &ViewRequest,
        settings: Option<&StageSettings>,
        warnings: &mut Vec<String>,
    ) -> ReviewResult<&Layout> {
        if let Some(layout_id) = settings.and_then(|s| s.layout_id.as_deref()) {
            match self.catalog.layout(layout_id) {
                Some(layout) => return Ok(layout),
                None => warnings.push(format!(
                    "Stage layout override '{}' is not in the catalog",
                    layout_id
                )),
            }
        }

        let key = LayoutKey {
            request_type: &request.request_type,
            workflow_stage: &request.workflow_stage,
            agent_type: request.agent_type.as_deref(),
            agent_category: request.agent_category.as_deref(),
        };
        self.catalog
            .resolve(&key)
            .ok_or_else(|| ReviewError::LayoutNotFound {
                request_type: request.request_type.clone(),
                stage: request.workflow_stage.clone(),
            })
    }
}
