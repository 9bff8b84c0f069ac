//! Step assignment
//!
//! Order of precedence: the first matching assignment rule, then the
//! step's auto-assign pool, then the step's assigned role. Pool picks hash
//! the entity id so a re-planned transition lands on the same assignee.

use crate::condition_evaluator::ConditionEvaluator;
use review_types::{WorkflowConfig, WorkflowStep};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// A concrete person or mailbox
    User(String),
    /// Anyone holding the role
    Role(String),
    Unassigned,
}

impl Assignment {
    /// Value recorded on the step ledger
    pub fn assigned_to(&self) -> Option<String> {
        match self {
            Self::User(user) => Some(user.clone()),
            Self::Role(role) => Some(role.clone()),
            Self::Unassigned => None,
        }
    }

    /// The next approver, when assignment named a person
    pub fn approver(&self) -> Option<&str> {
        match self {
            Self::User(user) => Some(user),
            Self::Role(_) | Self::Unassigned => None,
        }
    }
}

pub struct AssignmentResolver;

impl AssignmentResolver {
    pub fn assign(
        config: &WorkflowConfig,
        step: &WorkflowStep,
        entity_id: &str,
        data: &Value,
    ) -> Assignment {
        let by_rule = config
            .assignment_rules
            .iter()
            .filter(|r| r.step_number.map(|n| n == step.step_number).unwrap_or(true))
            .find(|r| match ConditionEvaluator::evaluate(&r.condition, data) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(step = step.step_number, error = %e, "Assignment rule skipped");
                    false
                }
            });
        if let Some(rule) = by_rule {
            return Assignment::User(rule.assign_to.clone());
        }

        if step.auto_assign && !step.assignee_pool.is_empty() {
            let digest = blake3::hash(entity_id.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest.as_bytes()[..8]);
            let index = (u64::from_le_bytes(bytes) % step.assignee_pool.len() as u64) as usize;
            return Assignment::User(step.assignee_pool[index].clone());
        }

        if step.assigned_role.trim().is_empty() {
            Assignment::Unassigned
        } else {
            Assignment::Role(step.assigned_role.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_types::{AssignmentRule, Condition, StepType};
    use serde_json::json;

    fn config() -> WorkflowConfig {
        WorkflowConfig::new("vendor", "Vendor")
            .with_step(WorkflowStep::new(1, StepType::Review).first().with_role("analyst"))
            .with_step(
                WorkflowStep::new(2, StepType::Approval)
                    .with_role("approver")
                    .with_auto_assign(vec!["ann@x.io".into(), "bob@x.io".into()]),
            )
            .with_step(WorkflowStep::new(3, StepType::Notification))
            .with_assignment_rule(AssignmentRule {
                step_number: Some(2),
                condition: Condition::gt("amount", 10_000.0),
                assign_to: "cfo@x.io".into(),
            })
    }

    #[test]
    fn test_rule_beats_pool() {
        let c = config();
        let step = c.step(2).unwrap();
        let assignment = AssignmentResolver::assign(&c, step, "v-1", &json!({"amount": 50_000}));
        assert_eq!(assignment, Assignment::User("cfo@x.io".into()));
        assert_eq!(assignment.approver(), Some("cfo@x.io"));
    }

    #[test]
    fn test_pool_pick_is_stable() {
        let c = config();
        let step = c.step(2).unwrap();
        let a = AssignmentResolver::assign(&c, step, "v-7", &json!({"amount": 10}));
        let b = AssignmentResolver::assign(&c, step, "v-7", &json!({"amount": 10}));
        assert_eq!(a, b);
        assert!(matches!(a, Assignment::User(ref u) if step.assignee_pool.contains(u)));
    }

    #[test]
    fn test_role_and_unassigned() {
        let c = config();
        let role = AssignmentResolver::assign(&c, c.step(1).unwrap(), "v-1", &json!({}));
        assert_eq!(role, Assignment::Role("analyst".into()));
        assert_eq!(role.approver(), None);
        assert_eq!(role.assigned_to().as_deref(), Some("analyst"));

        let none = AssignmentResolver::assign(&c, c.step(3).unwrap(), "v-1", &json!({}));
        assert_eq!(none, Assignment::Unassigned);
    }
}
