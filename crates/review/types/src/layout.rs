//! Form layouts and the role-filtered view structures derived from them

use crate::WILDCARD;
use serde::{Deserialize, Serialize};

// ── Layouts ──────────────────────────────────────────────────────────

/// A named grouping of tabs, sections and fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tabs: Vec<LayoutTab>,
    pub sections: Vec<LayoutSection>,
}

impl Layout {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tabs: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn with_tab(mut self, tab: LayoutTab) -> Self {
        self.tabs.push(tab);
        self
    }

    pub fn with_section(mut self, section: LayoutSection) -> Self {
        self.sections.push(section);
        self
    }

    /// Every field referenced by any section, in section order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter().map(String::as_str))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutTab {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub order: u32,
}

impl LayoutTab {
    pub fn new(id: impl Into<String>, order: u32) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            order,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Owning tab; sections without a tab render at the top level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    #[serde(default)]
    pub order: u32,
    pub fields: Vec<String>,
}

impl LayoutSection {
    pub fn new(id: impl Into<String>, order: u32, fields: Vec<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            tab: None,
            order,
            fields,
        }
    }

    pub fn in_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }
}

/// Binds a layout to a request type and stage, optionally narrowed by agent
/// type and category
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutBinding {
    pub layout_id: String,
    pub request_type: String,
    /// Exact stage or `*`
    pub workflow_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_category: Option<String>,
}

impl LayoutBinding {
    pub fn new(
        layout_id: impl Into<String>,
        request_type: impl Into<String>,
        workflow_stage: impl Into<String>,
    ) -> Self {
        Self {
            layout_id: layout_id.into(),
            request_type: request_type.into(),
            workflow_stage: workflow_stage.into(),
            agent_type: None,
            agent_category: None,
        }
    }

    pub fn for_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn for_agent_category(mut self, category: impl Into<String>) -> Self {
        self.agent_category = Some(category.into());
        self
    }

    /// Match score for a lookup, higher is more specific.
    ///
    /// Agent type outweighs category, which outweighs an exact stage. A
    /// binding that narrows on a dimension the lookup does not supply does
    /// not match.
    pub fn specificity(&self, key: &LayoutKey<'_>) -> Option<u8> {
        if self.request_type != key.request_type {
            return None;
        }
        let mut score = 0;
        if self.workflow_stage != WILDCARD {
            if self.workflow_stage != key.workflow_stage {
                return None;
            }
            score += 1;
        }
        if let Some(agent_type) = &self.agent_type {
            if key.agent_type != Some(agent_type.as_str()) {
                return None;
            }
            score += 4;
        }
        if let Some(category) = &self.agent_category {
            if key.agent_category != Some(category.as_str()) {
                return None;
            }
            score += 2;
        }
        Some(score)
    }
}

/// Catalog lookup key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutKey<'a> {
    pub request_type: &'a str,
    pub workflow_stage: &'a str,
    pub agent_type: Option<&'a str>,
    pub agent_category: Option<&'a str>,
}

// ── View structures ──────────────────────────────────────────────────

/// A layout filtered for one stage and viewer role
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewStructure {
    pub layout_id: Option<String>,
    pub tabs: Vec<ViewTab>,
    pub sections: Vec<ViewSection>,
    pub fields: Vec<ViewField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ViewStructure {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewTab {
    pub id: String,
    pub title: String,
    pub order: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSection {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    pub order: u32,
    pub fields: Vec<ViewField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewField {
    pub name: String,
    pub section: String,
    pub can_edit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<'a>(stage: &'a str, agent_type: Option<&'a str>) -> LayoutKey<'a> {
        LayoutKey {
            request_type: "agent",
            workflow_stage: stage,
            agent_type,
            agent_category: None,
        }
    }

    #[test]
    fn test_binding_specificity() {
        let wildcard = LayoutBinding::new("base", "agent", "*");
        let staged = LayoutBinding::new("review", "agent", "review");
        let typed = LayoutBinding::new("broker", "agent", "*").for_agent_type("broker");

        assert_eq!(wildcard.specificity(&key("review", None)), Some(0));
        assert_eq!(staged.specificity(&key("review", None)), Some(1));
        assert_eq!(staged.specificity(&key("approval", None)), None);
        assert_eq!(typed.specificity(&key("review", None)), None);
        assert_eq!(typed.specificity(&key("review", Some("broker"))), Some(4));
    }

    #[test]
    fn test_field_names_in_section_order() {
        let layout = Layout::new("l")
            .with_section(LayoutSection::new("a", 1, vec!["name".into(), "email".into()]))
            .with_section(LayoutSection::new("b", 2, vec!["risk_score".into()]));
        let names: Vec<_> = layout.field_names().collect();
        assert_eq!(names, vec!["name", "email", "risk_score"]);
    }
}
