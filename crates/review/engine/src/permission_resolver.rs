//! Permission resolver: field visibility and editability per role
//!
//! Resolution is deny-by-default. Among the grants that apply to an
//! (entity, field, role) triple the most specific one wins; ties go to the
//! grant declared first.

use review_types::{FieldPermission, PermissionRule, ReviewError, ReviewResult};

/// Answers what a role may do with a field
pub trait PermissionResolver: Send + Sync {
    fn resolve(&self, entity: &str, field: &str, role: &str) -> ReviewResult<FieldPermission>;
}

/// Resolver backed by a fixed list of grants
#[derive(Clone, Debug, Default)]
pub struct StaticPermissionResolver {
    rules: Vec<PermissionRule>,
    fallback: FieldPermission,
}

impl StaticPermissionResolver {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self {
            rules,
            fallback: FieldPermission::HIDDEN,
        }
    }

    /// Permission used when no grant applies
    pub fn with_fallback(mut self, fallback: FieldPermission) -> Self {
        self.fallback = fallback.normalized();
        self
    }

    pub fn add_rule(&mut self, rule: PermissionRule) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl PermissionResolver for StaticPermissionResolver {
    fn resolve(&self, entity: &str, field: &str, role: &str) -> ReviewResult<FieldPermission> {
        if role.trim().is_empty() {
            return Err(ReviewError::PermissionResolutionFailure {
                entity: entity.to_string(),
                field: field.to_string(),
                role: role.to_string(),
                reason: "no viewer role".into(),
            });
        }

        let mut best: Option<(u8, &PermissionRule)> = None;
        for rule in &self.rules {
            if let Some(score) = rule.specificity(entity, field, role) {
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, rule));
                }
            }
        }

        Ok(best
            .map(|(_, rule)| rule.permission())
            .unwrap_or(self.fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticPermissionResolver {
        StaticPermissionResolver::new(vec![
            PermissionRule::new("agent", "*", "*", FieldPermission::READ_ONLY),
            PermissionRule::new("agent", "*", "reviewer", FieldPermission::EDITABLE),
            PermissionRule::new("agent", "ssn", "reviewer", FieldPermission::HIDDEN),
        ])
    }

    #[test]
    fn test_most_specific_wins() {
        let r = resolver();
        assert_eq!(
            r.resolve("agent", "name", "reviewer").unwrap(),
            FieldPermission::EDITABLE
        );
        assert_eq!(
            r.resolve("agent", "ssn", "reviewer").unwrap(),
            FieldPermission::HIDDEN
        );
        assert_eq!(
            r.resolve("agent", "name", "auditor").unwrap(),
            FieldPermission::READ_ONLY
        );
    }

    #[test]
    fn test_deny_by_default() {
        let r = resolver();
        assert_eq!(
            r.resolve("vendor", "name", "reviewer").unwrap(),
            FieldPermission::HIDDEN
        );
        let open = StaticPermissionResolver::default().with_fallback(FieldPermission::READ_ONLY);
        assert!(open.resolve("vendor", "name", "x").unwrap().can_view);
    }

    #[test]
    fn test_missing_role_fails() {
        let err = resolver().resolve("agent", "name", " ").unwrap_err();
        assert!(matches!(err, ReviewError::PermissionResolutionFailure { .. }));
        assert!(!err.is_fatal());
    }
}
