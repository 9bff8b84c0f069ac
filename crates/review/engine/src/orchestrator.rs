//! Review orchestrator
//!
//! Owns the lifecycle of approval instances. A transition runs as:
//!
//! 1. resolve the active default workflow for the request type and scope
//! 2. load (or lazily create) the entity's instance and validate the edge
//! 3. apply the step changes and commit them with the entity status
//! 4. evaluate rules for the target stage over the merged data
//! 5. plan notifications and reminders for the target stage
//! 6. generate the view for the acting role
//!
//! Steps 1 to 3 abort the transition. Rule actions run only after the
//! commit lands, so a conflicted or replayed transition fires none.
//! Failures in 4, 5 and 6 are recorded in the result as warnings.

use crate::action_handler::{
    ActionHandler, LoggingNotificationSender, NotificationSender, StandardActionHandler,
};
use crate::assignment::{Assignment, AssignmentResolver};
use crate::config::EngineConfig;
use crate::entity_locks::EntityLocks;
use crate::instance_store::{InMemoryInstanceStore, InstanceStore, StorageError, TransitionCommit};
use crate::layout_catalog::{InMemoryLayoutCatalog, LayoutCatalog};
use crate::notification_planner::{
    EntityDataRecipientResolver, NotificationPlanner, RecipientContext, RecipientResolver,
};
use crate::permission_resolver::{PermissionResolver, StaticPermissionResolver};
use crate::rule_engine::{IdempotencyGuard, RuleEngine};
use crate::state_machine::{StateMachine, TransitionPlan, TransitionTarget};
use crate::view_generator::ViewStructureGenerator;
use crate::workflow_registry::WorkflowRegistry;
use chrono::{DateTime, Utc};
use review_types::{
    ApprovalInstance, ApprovalInstanceId, InstanceStatus, NotificationPlan, ReviewError,
    ReviewResult, Rule, RuleEvaluationRequest, RuleEvaluationResult, TransitionRecord,
    TransitionRequest, TransitionResult, ViewRequest, ViewStructure, WorkflowConfig,
    WorkflowConfigId, WorkflowStep, CANCELLED_STAGE,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Commit attempts per transition before giving up with `PersistenceConflict`
const COMMIT_ATTEMPTS: usize = 2;

/// An in-progress step past its due date
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverdueStep {
    pub instance_id: ApprovalInstanceId,
    pub entity_type: String,
    pub entity_id: String,
    pub step_number: u32,
    pub stage: String,
    pub assigned_to: Option<String>,
    pub due_at: DateTime<Utc>,
}

// ── Builder ──────────────────────────────────────────────────────────

/// Wires the orchestrator's collaborators; anything unset gets the
/// in-memory or logging default.
pub struct ReviewOrchestratorBuilder {
    config: EngineConfig,
    catalog: Option<Arc<dyn LayoutCatalog>>,
    permissions: Option<Arc<dyn PermissionResolver>>,
    store: Option<Arc<dyn InstanceStore>>,
    sender: Option<Arc<dyn NotificationSender>>,
    handler: Option<Arc<dyn ActionHandler>>,
    recipients: Option<Arc<dyn RecipientResolver>>,
    registry: WorkflowRegistry,
}

impl ReviewOrchestratorBuilder {
    pub fn with_catalog(mut self, catalog: Arc<dyn LayoutCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionResolver>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Replaces the standard handler, so `with_sender` no longer applies
    pub fn with_action_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_recipient_resolver(mut self, resolver: Arc<dyn RecipientResolver>) -> Self {
        self.recipients = Some(resolver);
        self
    }

    pub fn with_registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> ReviewOrchestrator {
        let config = self.config;
        let recipients = self.recipients.unwrap_or_else(|| {
            Arc::new(
                EntityDataRecipientResolver::new(config.recipient_fields.clone())
                    .with_roles(config.role_directory.clone()),
            )
        });
        let planner = NotificationPlanner::new(recipients, config.default_sla_days);
        let handler = self.handler.unwrap_or_else(|| {
            let sender = self
                .sender
                .unwrap_or_else(|| Arc::new(LoggingNotificationSender));
            Arc::new(StandardActionHandler::new(
                sender,
                planner.clone(),
                config.action_timeout(),
            ))
        });
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(InMemoryLayoutCatalog::new()));
        let permissions = self
            .permissions
            .unwrap_or_else(|| Arc::new(StaticPermissionResolver::new(Vec::new())));

        ReviewOrchestrator {
            registry: RwLock::new(self.registry),
            rules: RuleEngine::new(handler, config.action_timeout()).with_idempotency(
                IdempotencyGuard::bounded(config.idempotency_ttl(), config.idempotency_capacity),
            ),
            views: ViewStructureGenerator::new(catalog, permissions),
            planner,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryInstanceStore::new())),
            locks: EntityLocks::new(config.lock_timeout()),
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────

pub struct ReviewOrchestrator {
    registry: RwLock<WorkflowRegistry>,
    rules: RuleEngine,
    views: ViewStructureGenerator,
    planner: NotificationPlanner,
    store: Arc<dyn InstanceStore>,
    locks: EntityLocks,
}

impl ReviewOrchestrator {
    pub fn builder(config: EngineConfig) -> ReviewOrchestratorBuilder {
        ReviewOrchestratorBuilder {
            config,
            catalog: None,
            permissions: None,
            store: None,
            sender: None,
            handler: None,
            recipients: None,
            registry: WorkflowRegistry::new(),
        }
    }

    // ── Workflow configs ─────────────────────────────────────────────

    pub async fn register_workflow(&self, config: WorkflowConfig) -> ReviewResult<WorkflowConfigId> {
        self.registry.write().await.register(config)
    }

    pub async fn activate_workflow(&self, id: &WorkflowConfigId) -> ReviewResult<Arc<WorkflowConfig>> {
        self.registry.write().await.activate(id)
    }

    /// Open instances keep running on the config they started with
    pub async fn deactivate_workflow(
        &self,
        id: &WorkflowConfigId,
    ) -> ReviewResult<Arc<WorkflowConfig>> {
        self.registry.write().await.deactivate(id)
    }

    pub async fn workflow(&self, id: &WorkflowConfigId) -> ReviewResult<Arc<WorkflowConfig>> {
        self.registry.read().await.get(id)
    }

    pub async fn workflows(&self) -> Vec<Arc<WorkflowConfig>> {
        self.registry.read().await.list()
    }

    pub async fn active_workflow(&self, request_type: &str) -> ReviewResult<Arc<WorkflowConfig>> {
        self.registry.read().await.active_default(request_type)
    }

    pub async fn active_workflow_in(
        &self,
        request_type: &str,
        scope: &str,
    ) -> ReviewResult<Arc<WorkflowConfig>> {
        self.registry.read().await.active_default_in(request_type, scope)
    }

    /// Register an engine-wide rule
    pub async fn add_rule(&self, rule: Rule) -> ReviewResult<()> {
        self.rules.add_rule(rule).await
    }

    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.rules().await
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Move an entity from `current_stage` to `target_stage`.
    ///
    /// Repeating the last applied transition is a no-op that returns the
    /// stored instance with `advanced == false`.
    pub async fn transition_stage(&self, request: TransitionRequest) -> ReviewResult<TransitionResult> {
        let active = self
            .active_workflow_in(&request.request_type, &request.scope)
            .await?;
        let _guard = self
            .locks
            .acquire(&request.entity_type, &request.entity_id)
            .await?;
        let data = request.merged_data();

        let mut attempt = 0;
        let (stored, plan, config, assignment) = loop {
            attempt += 1;
            let (instance, expected_version) = match self.load_for_transition(&active, &request, &data).await? {
                Loaded::Replay(instance) => {
                    tracing::info!(
                        entity_id = %request.entity_id,
                        from = %request.current_stage,
                        to = %request.target_stage,
                        "Transition already applied"
                    );
                    return Ok(self.replay_result(&request, instance).await);
                }
                Loaded::Ready {
                    instance,
                    expected_version,
                } => (instance, expected_version),
            };

            let config = self.config_for(&active, &instance).await?;
            let plan = StateMachine::plan(&config, &instance, &request, &data)?;
            let (changed, assignment) = apply_plan(&config, instance, &plan, &request, &data);
            let commit = TransitionCommit {
                instance: changed,
                expected_version,
                entity_status: plan.target_stage.clone(),
            };
            match self.store.commit(commit).await {
                Ok(stored) => break (stored, plan, config, assignment),
                Err(StorageError::VersionConflict { expected, found }) if attempt < COMMIT_ATTEMPTS => {
                    tracing::warn!(
                        entity_id = %request.entity_id,
                        expected,
                        found,
                        "Commit lost a race; retrying"
                    );
                }
                Err(e) => return Err(e.into_review(&request.entity_type, &request.entity_id)),
            }
        };

        tracing::info!(
            instance_id = %stored.id.short(),
            entity_id = %request.entity_id,
            from = %plan.from_stage,
            to = %plan.target_stage,
            skipped = plan.skipped.len(),
            "Stage transition committed"
        );

        let target_step = match plan.target {
            TransitionTarget::Step(number) => config.step(number),
            TransitionTarget::Approved | TransitionTarget::Rejected => None,
        };

        let rule_request = RuleEvaluationRequest::new(
            &request.entity_type,
            &request.entity_id,
            data.clone(),
            &request.request_type,
            &plan.target_stage,
        )
        .in_scope(&request.scope)
        .for_instance(stored.id.clone(), target_step.map(|s| s.step_number))
        .with_next_approver(assignment.approver());
        let rule_results = self.rules.evaluate(&rule_request, &config.trigger_rules).await;

        let mut warnings: Vec<String> = rule_results
            .failures()
            .iter()
            .map(ToString::to_string)
            .collect();

        let notifications = self.plan_notifications(&config, &plan, &request, &data, &assignment);
        warnings.extend(notifications.failures.iter().map(|f| f.to_error().to_string()));
        warnings.extend(notifications.warnings.iter().cloned());

        let view_structure = match self.view_for(&request, &plan.target_stage, target_step) {
            Ok(view) => Some(view),
            Err(e) => {
                tracing::warn!(entity_id = %request.entity_id, error = %e, "View generation failed");
                warnings.push(e.to_string());
                None
            }
        };

        Ok(TransitionResult {
            success: true,
            advanced: true,
            current_stage: stored.current_stage.clone(),
            target_stage: plan.target_stage,
            instance: stored,
            rule_results,
            notifications: notifications.recipients,
            notification_failures: notifications.failures,
            reminders: notifications.reminders,
            due_date: notifications.due_date,
            view_structure,
            warnings,
        })
    }

    /// Evaluate rules for a stage outside of a transition
    pub async fn evaluate_rules(&self, request: &RuleEvaluationRequest) -> ReviewResult<RuleEvaluationResult> {
        let trigger_rules = match self
            .active_workflow_in(&request.request_type, &request.scope)
            .await
        {
            Ok(config) => config.trigger_rules.clone(),
            Err(ReviewError::InvalidWorkflow { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(self.rules.evaluate(request, &trigger_rules).await)
    }

    /// Build the view a role sees at a stage.
    ///
    /// With an `entity_id` whose open instance sits at the stage, the
    /// instance's current step supplies the settings. Otherwise the first
    /// step of the active workflow carrying the stage name does.
    pub async fn generate_view_structure(&self, request: &ViewRequest) -> ReviewResult<ViewStructure> {
        if let Some((config, number)) = self.instance_step(request).await? {
            return self.generate_for_step(request, config.step(number));
        }
        match self
            .active_workflow_in(&request.request_type, &request.scope)
            .await
        {
            Ok(config) => self.generate_for_step(request, config.step_for_stage(&request.workflow_stage)),
            Err(ReviewError::InvalidWorkflow { .. }) => self.views.generate(request, None, None),
            Err(e) => Err(e),
        }
    }

    // ── Instance lifecycle ───────────────────────────────────────────

    /// Open an instance at the first step without moving it
    pub async fn start_instance(
        &self,
        entity_type: &str,
        entity_id: &str,
        request_type: &str,
        scope: &str,
        entity_data: &Value,
    ) -> ReviewResult<ApprovalInstance> {
        let config = self.active_workflow_in(request_type, scope).await?;
        let _guard = self.locks.acquire(entity_type, entity_id).await?;

        let previous = self.latest(entity_type, entity_id).await?;
        if previous.as_ref().map(ApprovalInstance::is_open).unwrap_or(false) {
            return Err(ReviewError::InstanceAlreadyOpen {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            });
        }

        let mut instance = new_instance(&config, entity_type, entity_id, entity_data)?;
        if let Some(previous) = previous {
            instance = instance.with_previous(previous.id);
        }
        let stored = self.commit_new(instance).await?;
        tracing::info!(instance_id = %stored.id.short(), entity_id, stage = %stored.current_stage, "Approval instance started");
        Ok(stored)
    }

    /// Start a fresh instance for an entity whose last instance finished
    pub async fn request_re_review(
        &self,
        entity_type: &str,
        entity_id: &str,
        request_type: &str,
        scope: &str,
        reason: Option<String>,
    ) -> ReviewResult<ApprovalInstance> {
        let config = self.active_workflow_in(request_type, scope).await?;
        let _guard = self.locks.acquire(entity_type, entity_id).await?;

        let previous = self
            .latest(entity_type, entity_id)
            .await?
            .ok_or_else(|| ReviewError::InstanceNotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })?;
        if previous.is_open() {
            return Err(ReviewError::illegal(
                &previous.current_stage,
                config.first_step().map(|s| s.stage_name()).unwrap_or_default(),
                "re-review needs a finished instance",
            ));
        }

        let mut instance = new_instance(&config, entity_type, entity_id, &Value::Object(Map::new()))?
            .with_previous(previous.id.clone());
        instance.record_transition(TransitionRecord {
            from_stage: previous.current_stage.clone(),
            to_stage: instance.current_stage.clone(),
            from_step: previous.current_step,
            to_step: Some(instance.current_step),
            acting_role: None,
            notes: reason,
            at: Utc::now(),
        });
        let stored = self.commit_new(instance).await?;
        tracing::info!(
            instance_id = %stored.id.short(),
            previous = %previous.id.short(),
            entity_id,
            "Re-review started"
        );
        Ok(stored)
    }

    /// Withdraw the entity's open instance
    pub async fn cancel(
        &self,
        entity_type: &str,
        entity_id: &str,
        reason: Option<String>,
    ) -> ReviewResult<ApprovalInstance> {
        let _guard = self.locks.acquire(entity_type, entity_id).await?;
        let mut instance = self
            .latest(entity_type, entity_id)
            .await?
            .filter(ApprovalInstance::is_open)
            .ok_or_else(|| ReviewError::InstanceNotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })?;

        let expected_version = instance.version;
        instance.cancel(reason);
        let stored = self
            .store
            .commit(TransitionCommit {
                instance,
                expected_version,
                entity_status: CANCELLED_STAGE.to_string(),
            })
            .await
            .map_err(|e| e.into_review(entity_type, entity_id))?;
        tracing::info!(instance_id = %stored.id.short(), entity_id, "Approval instance cancelled");
        Ok(stored)
    }

    /// The entity's most recent instance
    pub async fn instance(&self, entity_type: &str, entity_id: &str) -> ReviewResult<ApprovalInstance> {
        self.latest(entity_type, entity_id)
            .await?
            .ok_or_else(|| ReviewError::InstanceNotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })
    }

    /// All of the entity's instances, oldest first
    pub async fn instance_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> ReviewResult<Vec<ApprovalInstance>> {
        self.store
            .history(entity_type, entity_id)
            .await
            .map_err(|e| e.into_review(entity_type, entity_id))
    }

    pub async fn entity_status(&self, entity_type: &str, entity_id: &str) -> ReviewResult<Option<String>> {
        self.store
            .entity_status(entity_type, entity_id)
            .await
            .map_err(|e| e.into_review(entity_type, entity_id))
    }

    /// In-progress steps whose SLA has lapsed at `now`
    pub async fn overdue_steps(&self, now: DateTime<Utc>) -> ReviewResult<Vec<OverdueStep>> {
        let open = self
            .store
            .open_instances()
            .await
            .map_err(|e| ReviewError::Storage(e.to_string()))?;
        let registry = self.registry.read().await;

        let mut overdue = Vec::new();
        for instance in open {
            let Ok(config) = registry.get(&instance.config_id) else {
                continue;
            };
            let Some(due_in_days) = config.step(instance.current_step).and_then(|s| s.due_in_days) else {
                continue;
            };
            let (Some(active), Some(due_at)) = (instance.active_step(), instance.active_step_due(due_in_days)) else {
                continue;
            };
            if due_at < now {
                overdue.push(OverdueStep {
                    instance_id: instance.id.clone(),
                    entity_type: instance.entity_type.clone(),
                    entity_id: instance.entity_id.clone(),
                    step_number: active.step_number,
                    stage: active.stage.clone(),
                    assigned_to: active.assigned_to.clone(),
                    due_at,
                });
            }
        }
        overdue.sort_by_key(|o| o.due_at);
        Ok(overdue)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn latest(&self, entity_type: &str, entity_id: &str) -> ReviewResult<Option<ApprovalInstance>> {
        self.store
            .latest(entity_type, entity_id)
            .await
            .map_err(|e| e.into_review(entity_type, entity_id))
    }

    async fn load_for_transition(
        &self,
        active: &WorkflowConfig,
        request: &TransitionRequest,
        data: &Value,
    ) -> ReviewResult<Loaded> {
        match self.latest(&request.entity_type, &request.entity_id).await? {
            Some(instance) if instance.is_replay_of(&request.current_stage, &request.target_stage) => {
                Ok(Loaded::Replay(instance))
            }
            Some(instance) => Ok(Loaded::Ready {
                expected_version: instance.version,
                instance,
            }),
            None => Ok(Loaded::Ready {
                instance: new_instance(active, &request.entity_type, &request.entity_id, data)?,
                expected_version: 0,
            }),
        }
    }

    /// Open instances run on the config they started with
    async fn config_for(
        &self,
        active: &Arc<WorkflowConfig>,
        instance: &ApprovalInstance,
    ) -> ReviewResult<Arc<WorkflowConfig>> {
        if instance.config_id == active.id {
            Ok(active.clone())
        } else {
            self.workflow(&instance.config_id).await
        }
    }

    async fn commit_new(&self, instance: ApprovalInstance) -> ReviewResult<ApprovalInstance> {
        let entity_type = instance.entity_type.clone();
        let entity_id = instance.entity_id.clone();
        let entity_status = instance.current_stage.clone();
        self.store
            .commit(TransitionCommit {
                instance,
                expected_version: 0,
                entity_status,
            })
            .await
            .map_err(|e| e.into_review(&entity_type, &entity_id))
    }

    fn plan_notifications(
        &self,
        config: &WorkflowConfig,
        plan: &TransitionPlan,
        request: &TransitionRequest,
        data: &Value,
        assignment: &Assignment,
    ) -> NotificationPlan {
        let TransitionTarget::Step(number) = plan.target else {
            return NotificationPlan::empty();
        };
        let Some(step) = config.step(number) else {
            return NotificationPlan::empty();
        };
        let ctx = RecipientContext {
            data,
            next_approver: assignment.approver(),
            acting_role: request.acting_role.as_deref(),
            target_role: Some(step.assigned_role.as_str()).filter(|r| !r.is_empty()),
        };
        self.planner
            .plan(step.notifications(), step.due_in_days, &ctx, Utc::now())
    }

    /// Open instance step matching the view's entity and stage
    async fn instance_step(&self, request: &ViewRequest) -> ReviewResult<Option<(Arc<WorkflowConfig>, u32)>> {
        let Some(entity_id) = request.entity_id.as_deref() else {
            return Ok(None);
        };
        let Some(instance) = self.latest(&request.entity_name, entity_id).await? else {
            return Ok(None);
        };
        if !instance.is_open() || instance.current_stage != request.workflow_stage {
            return Ok(None);
        }
        Ok(self
            .workflow(&instance.config_id)
            .await
            .ok()
            .map(|config| (config, instance.current_step)))
    }

    fn generate_for_step(&self, request: &ViewRequest, step: Option<&WorkflowStep>) -> ReviewResult<ViewStructure> {
        self.views.generate(
            request,
            step.and_then(|s| s.stage_settings.as_ref()),
            step.map(|s| s.assigned_role.as_str()).filter(|r| !r.is_empty()),
        )
    }

    /// View for the step a transition landed on; `None` for terminal stages
    fn view_for(
        &self,
        request: &TransitionRequest,
        stage: &str,
        step: Option<&WorkflowStep>,
    ) -> ReviewResult<ViewStructure> {
        let view = ViewRequest {
            entity_name: request.entity_type.clone(),
            request_type: request.request_type.clone(),
            scope: request.scope.clone(),
            workflow_stage: stage.to_string(),
            entity_id: Some(request.entity_id.clone()),
            agent_type: request.agent_type.clone(),
            agent_category: request.agent_category.clone(),
            viewer_role: request.acting_role.clone(),
        };
        self.generate_for_step(&view, step)
    }

    async fn replay_result(&self, request: &TransitionRequest, instance: ApprovalInstance) -> TransitionResult {
        let config = self.config_for_replay(&instance).await;
        let view_structure = config.and_then(|c| {
            let step = c
                .step(instance.current_step)
                .filter(|_| instance.is_open());
            self.view_for(request, &instance.current_stage, step).ok()
        });
        TransitionResult {
            success: true,
            advanced: false,
            current_stage: instance.current_stage.clone(),
            target_stage: request.target_stage.clone(),
            instance,
            rule_results: RuleEvaluationResult::default(),
            notifications: Vec::new(),
            notification_failures: Vec::new(),
            reminders: Vec::new(),
            due_date: None,
            view_structure,
            warnings: vec!["transition already applied".to_string()],
        }
    }

    async fn config_for_replay(&self, instance: &ApprovalInstance) -> Option<Arc<WorkflowConfig>> {
        self.workflow(&instance.config_id).await.ok()
    }
}

enum Loaded {
    Replay(ApprovalInstance),
    Ready {
        instance: ApprovalInstance,
        expected_version: u64,
    },
}

fn new_instance(
    config: &WorkflowConfig,
    entity_type: &str,
    entity_id: &str,
    data: &Value,
) -> ReviewResult<ApprovalInstance> {
    let first = config
        .first_step()
        .ok_or_else(|| ReviewError::ConfigValidation(format!("Workflow '{}' has no first step", config.id)))?;
    let assignment = AssignmentResolver::assign(config, first, entity_id, data);
    let mut instance = ApprovalInstance::new(config, entity_type, entity_id)
        .ok_or_else(|| ReviewError::ConfigValidation(format!("Workflow '{}' has no first step", config.id)))?;
    instance.start(assignment.assigned_to());
    Ok(instance)
}

/// Apply a validated plan to the instance ledger
fn apply_plan(
    config: &WorkflowConfig,
    mut instance: ApprovalInstance,
    plan: &TransitionPlan,
    request: &TransitionRequest,
    data: &Value,
) -> (ApprovalInstance, Assignment) {
    instance.complete_current_step(request.notes());
    for number in &plan.skipped {
        if let Some(step) = config.step(*number) {
            instance.skip_step(*number, step.stage_name());
        }
    }

    let mut assignment = Assignment::Unassigned;
    let to_step = match plan.target {
        TransitionTarget::Step(number) => {
            if let Some(step) = config.step(number) {
                assignment = AssignmentResolver::assign(config, step, &request.entity_id, data);
                instance.enter_step(number, step.stage_name(), assignment.assigned_to());
            }
            Some(number)
        }
        TransitionTarget::Approved => {
            instance.finish(InstanceStatus::Approved);
            None
        }
        TransitionTarget::Rejected => {
            instance.finish(InstanceStatus::Rejected);
            None
        }
    };

    instance.record_transition(TransitionRecord {
        from_stage: plan.from_stage.clone(),
        to_stage: plan.target_stage.clone(),
        from_step: plan.from_step,
        to_step,
        acting_role: request.acting_role.clone(),
        notes: request.notes(),
        at: Utc::now(),
    });
    (instance, assignment)
}
