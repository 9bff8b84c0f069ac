//! State machine: pure edge validation for stage transitions
//!
//! States are the config's stage names plus `approved` and `rejected`.
//! Instances only move forward. Legal edges from the current step:
//!
//! - to a later step when every step in between may be skipped
//! - to `approved` from the last step, from an optional step, or when all
//!   remaining steps may be skipped
//! - to `rejected` from an optional step, or with an explicit rejection
//!
//! The target step's entry guards must hold over the merged data.

use crate::condition_evaluator::ConditionEvaluator;
use review_types::{
    ApprovalInstance, ReviewError, ReviewResult, TransitionRequest, WorkflowConfig, WorkflowStep,
    APPROVED_STAGE, REJECTED_STAGE,
};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionTarget {
    Step(u32),
    Approved,
    Rejected,
}

impl TransitionTarget {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Step(_))
    }
}

/// A validated transition, ready to apply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from_step: u32,
    pub from_stage: String,
    pub target: TransitionTarget,
    pub target_stage: String,
    /// Steps passed over, in order
    pub skipped: Vec<u32>,
}

pub struct StateMachine;

impl StateMachine {
    /// Validate `request` against the instance's position.
    ///
    /// `data` is the entity data merged with the transition data.
    pub fn plan(
        config: &WorkflowConfig,
        instance: &ApprovalInstance,
        request: &TransitionRequest,
        data: &Value,
    ) -> ReviewResult<TransitionPlan> {
        let from = &request.current_stage;
        let to = &request.target_stage;

        if instance.is_terminal() {
            return Err(ReviewError::illegal(
                from,
                to,
                format!("instance is already {:?}", instance.status).to_lowercase(),
            ));
        }
        if instance.current_stage != *from {
            return Err(ReviewError::illegal(
                from,
                to,
                format!("entity is at stage '{}'", instance.current_stage),
            ));
        }
        let current = config.step(instance.current_step).ok_or_else(|| {
            ReviewError::illegal(
                from,
                to,
                format!("step {} is not in the workflow", instance.current_step),
            )
        })?;
        let remaining = config.steps_after(current.step_number);

        let (target, skipped) = match to.as_str() {
            APPROVED_STAGE => {
                let all_skippable = remaining.iter().all(|s| s.can_skip);
                if !(remaining.is_empty() || !current.required || all_skippable) {
                    return Err(ReviewError::illegal(
                        from,
                        to,
                        "required steps remain before approval",
                    ));
                }
                (
                    TransitionTarget::Approved,
                    remaining.iter().map(|s| s.step_number).collect(),
                )
            }
            REJECTED_STAGE => {
                if current.required && !request.is_explicit_rejection() {
                    return Err(ReviewError::illegal(
                        from,
                        to,
                        "rejection from a required step needs an explicit reject decision",
                    ));
                }
                (TransitionTarget::Rejected, Vec::new())
            }
            stage => {
                let position = remaining
                    .iter()
                    .position(|s| s.stage_name() == stage)
                    .ok_or_else(|| {
                        ReviewError::illegal(from, to, "target is not a later stage of this workflow")
                    })?;
                let between = &remaining[..position];
                if let Some(blocking) = between.iter().find(|s| !s.can_skip) {
                    return Err(ReviewError::illegal(
                        from,
                        to,
                        format!("step {} ('{}') cannot be skipped", blocking.step_number, blocking.stage_name()),
                    ));
                }
                let target = remaining[position];
                Self::check_guards(config, target, request, data)?;
                (
                    TransitionTarget::Step(target.step_number),
                    between.iter().map(|s| s.step_number).collect(),
                )
            }
        };

        Ok(TransitionPlan {
            from_step: current.step_number,
            from_stage: from.clone(),
            target,
            target_stage: to.clone(),
            skipped,
        })
    }

    fn check_guards(
        config: &WorkflowConfig,
        target: &WorkflowStep,
        request: &TransitionRequest,
        data: &Value,
    ) -> ReviewResult<()> {
        for guard in config.guards_for(target.step_number) {
            let label = if guard.description.is_empty() {
                format!("entry condition for step {}", target.step_number)
            } else {
                guard.description.clone()
            };
            match ConditionEvaluator::evaluate(&guard.condition, data) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ReviewError::illegal(
                        &request.current_stage,
                        &request.target_stage,
                        format!("{} not met", label),
                    ))
                }
                Err(e) => {
                    return Err(ReviewError::illegal(
                        &request.current_stage,
                        &request.target_stage,
                        format!("{} could not be evaluated: {}", label, e),
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_types::{Condition, StageCondition, StepType, WorkflowStep};
    use serde_json::json;

    fn config() -> WorkflowConfig {
        WorkflowConfig::new("agent", "Agent")
            .with_step(WorkflowStep::new(1, StepType::Review).first())
            .with_step(WorkflowStep::new(2, StepType::Review).named("compliance").skippable())
            .with_step(WorkflowStep::new(3, StepType::Approval))
            .with_step(WorkflowStep::new(4, StepType::Notification).skippable())
            .with_condition(StageCondition {
                step_number: 3,
                condition: Condition::exists("documents"),
                description: "documents uploaded".into(),
            })
    }

    fn instance_at(config: &WorkflowConfig, step: u32) -> ApprovalInstance {
        let mut instance = ApprovalInstance::new(config, "agent", "agent-1").unwrap();
        instance.start(None);
        if step != 1 {
            let stage = config.step(step).unwrap().stage_name();
            instance.complete_current_step(None);
            instance.enter_step(step, stage, None);
        }
        instance
    }

    fn plan(
        config: &WorkflowConfig,
        instance: &ApprovalInstance,
        from: &str,
        to: &str,
        data: Value,
    ) -> ReviewResult<TransitionPlan> {
        let req = TransitionRequest::new("agent", "agent-1", "agent", from, to)
            .with_transition_data(data.clone());
        StateMachine::plan(config, instance, &req, &data)
    }

    #[test]
    fn test_next_step() {
        let c = config();
        let p = plan(&c, &instance_at(&c, 1), "review", "compliance", json!({})).unwrap();
        assert_eq!(p.target, TransitionTarget::Step(2));
        assert!(p.skipped.is_empty());
    }

    #[test]
    fn test_skip_over_skippable_step() {
        let c = config();
        let p = plan(
            &c,
            &instance_at(&c, 1),
            "review",
            "approval",
            json!({"documents": ["a.pdf"]}),
        )
        .unwrap();
        assert_eq!(p.target, TransitionTarget::Step(3));
        assert_eq!(p.skipped, vec![2]);
    }

    #[test]
    fn test_guard_blocks_entry() {
        let c = config();
        let err = plan(&c, &instance_at(&c, 1), "review", "approval", json!({})).unwrap_err();
        assert!(matches!(err, ReviewError::IllegalTransition { ref reason, .. } if reason.contains("documents uploaded")));
    }

    #[test]
    fn test_cannot_skip_required_step() {
        let c = config();
        let err = plan(&c, &instance_at(&c, 1), "review", "notification", json!({})).unwrap_err();
        assert!(matches!(err, ReviewError::IllegalTransition { .. }));
    }

    #[test]
    fn test_backward_and_unknown_targets() {
        let c = config();
        let at_three = instance_at(&c, 3);
        assert!(plan(&c, &at_three, "approval", "review", json!({})).is_err());
        assert!(plan(&c, &at_three, "approval", "approval", json!({})).is_err());
        assert!(plan(&c, &at_three, "approval", "archived", json!({})).is_err());
    }

    #[test]
    fn test_stale_current_stage() {
        let c = config();
        let err = plan(&c, &instance_at(&c, 3), "review", "compliance", json!({})).unwrap_err();
        assert!(matches!(err, ReviewError::IllegalTransition { ref reason, .. } if reason.contains("'approval'")));
    }

    #[test]
    fn test_approval_rules() {
        let c = config();
        assert!(plan(&c, &instance_at(&c, 1), "review", "approved", json!({})).is_err());

        let p = plan(&c, &instance_at(&c, 3), "approval", "approved", json!({})).unwrap();
        assert_eq!(p.target, TransitionTarget::Approved);
        assert_eq!(p.skipped, vec![4]);
    }

    #[test]
    fn test_rejection_rules() {
        let c = config();
        let at_one = instance_at(&c, 1);
        assert!(plan(&c, &at_one, "review", "rejected", json!({})).is_err());
        let p = plan(&c, &at_one, "review", "rejected", json!({"decision": "reject"})).unwrap();
        assert_eq!(p.target, TransitionTarget::Rejected);

        let optional = WorkflowConfig::new("agent", "Optional")
            .with_step(WorkflowStep::new(1, StepType::Review).first().optional())
            .with_step(WorkflowStep::new(2, StepType::Approval));
        let inst = instance_at(&optional, 1);
        assert!(plan(&optional, &inst, "review", "rejected", json!({})).is_ok());
        assert!(plan(&optional, &inst, "review", "approved", json!({})).is_ok());
    }

    #[test]
    fn test_terminal_instance_rejects_everything() {
        let c = config();
        let mut inst = instance_at(&c, 3);
        inst.finish(review_types::InstanceStatus::Approved);
        assert!(plan(&c, &inst, "approved", "rejected", json!({"decision": "reject"})).is_err());
    }
}
