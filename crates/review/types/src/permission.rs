//! Field-level permissions per entity and role

use crate::WILDCARD;
use serde::{Deserialize, Serialize};

/// What a role may do with a field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPermission {
    pub can_view: bool,
    pub can_edit: bool,
}

impl FieldPermission {
    pub const HIDDEN: Self = Self {
        can_view: false,
        can_edit: false,
    };
    pub const READ_ONLY: Self = Self {
        can_view: true,
        can_edit: false,
    };
    pub const EDITABLE: Self = Self {
        can_view: true,
        can_edit: true,
    };

    /// Edit rights never outlive view rights
    pub fn normalized(self) -> Self {
        Self {
            can_view: self.can_view,
            can_edit: self.can_view && self.can_edit,
        }
    }
}

/// A permission grant; `entity`, `field` and `role` accept `*`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub entity: String,
    pub field: String,
    pub role: String,
    pub can_view: bool,
    #[serde(default)]
    pub can_edit: bool,
}

impl PermissionRule {
    pub fn new(
        entity: impl Into<String>,
        field: impl Into<String>,
        role: impl Into<String>,
        permission: FieldPermission,
    ) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
            role: role.into(),
            can_view: permission.can_view,
            can_edit: permission.can_edit,
        }
    }

    pub fn permission(&self) -> FieldPermission {
        FieldPermission {
            can_view: self.can_view,
            can_edit: self.can_edit,
        }
        .normalized()
    }

    /// Number of non-wildcard components, or `None` when the rule does not apply
    pub fn specificity(&self, entity: &str, field: &str, role: &str) -> Option<u8> {
        let mut score = 0;
        for (pattern, value) in [(&self.entity, entity), (&self.field, field), (&self.role, role)] {
            if pattern == WILDCARD {
                continue;
            }
            if pattern != value {
                return None;
            }
            score += 1;
        }
        Some(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_requires_view() {
        let perm = FieldPermission {
            can_view: false,
            can_edit: true,
        };
        assert_eq!(perm.normalized(), FieldPermission::HIDDEN);
    }

    #[test]
    fn test_specificity() {
        let exact = PermissionRule::new("agent", "ssn", "reviewer", FieldPermission::HIDDEN);
        let broad = PermissionRule::new("agent", "*", "*", FieldPermission::READ_ONLY);
        assert_eq!(exact.specificity("agent", "ssn", "reviewer"), Some(3));
        assert_eq!(broad.specificity("agent", "ssn", "reviewer"), Some(1));
        assert_eq!(exact.specificity("agent", "ssn", "admin"), None);
    }
}
