//! Review Workflow Engine
//!
//! Moves submitted entities through their configured review stages. A
//! single entry point, [`ReviewOrchestrator`], validates each stage
//! transition, runs the stage's rules, commits the instance and plans who
//! is told about it.
//!
//! # Architecture
//!
//! The orchestrator composes specialized components:
//!
//! - [`WorkflowRegistry`]: Validated configs and the active default per request type
//! - [`StateMachine`]: Pure validation of stage edges and entry guards
//! - [`RuleEngine`]: Condition matching plus isolated, de-duplicated actions
//! - [`ViewStructureGenerator`]: Layout selection and per-role field filtering
//! - [`NotificationPlanner`]: Recipient resolution and reminder dates
//! - [`InstanceStore`]: Optimistic, versioned instance persistence
//!
//! # Example
//!
//! ```rust
//! use review_engine::{EngineConfig, ReviewOrchestrator};
//! use review_types::*;
//!
//! # tokio_test_block(async {
//! let engine = ReviewOrchestrator::builder(EngineConfig::default()).build();
//! engine
//!     .register_workflow(
//!         WorkflowConfig::new("agent", "Agent onboarding")
//!             .with_step(WorkflowStep::new(1, StepType::Review).first())
//!             .with_step(WorkflowStep::new(2, StepType::Approval))
//!             .as_default()
//!             .with_status(ConfigStatus::Active),
//!     )
//!     .await
//!     .unwrap();
//!
//! let result = engine
//!     .transition_stage(TransitionRequest::new("agent", "a-1", "agent", "review", "approval"))
//!     .await
//!     .unwrap();
//! assert_eq!(result.current_stage, "approval");
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]

pub mod action_handler;
pub mod assignment;
pub mod condition_evaluator;
pub mod config;
pub mod entity_locks;
pub mod instance_store;
pub mod layout_catalog;
pub mod notification_planner;
pub mod orchestrator;
pub mod permission_resolver;
pub mod rule_engine;
pub mod state_machine;
pub mod view_generator;
pub mod workflow_registry;

// Re-export main types
pub use action_handler::{
    ActionContext, ActionError, ActionHandler, LoggingNotificationSender, NotificationSender,
    OutboundMessage, StandardActionHandler,
};
pub use assignment::{Assignment, AssignmentResolver};
pub use condition_evaluator::{ConditionError, ConditionEvaluator};
pub use config::EngineConfig;
pub use entity_locks::EntityLocks;
pub use instance_store::{
    InMemoryInstanceStore, InstanceStore, StorageError, StorageResult, TransitionCommit,
};
pub use layout_catalog::{InMemoryLayoutCatalog, LayoutCatalog};
pub use notification_planner::{
    EntityDataRecipientResolver, NotificationPlanner, RecipientContext, RecipientFields,
    RecipientResolver,
};
pub use orchestrator::{OverdueStep, ReviewOrchestrator, ReviewOrchestratorBuilder};
pub use permission_resolver::{PermissionResolver, StaticPermissionResolver};
pub use rule_engine::{IdempotencyGuard, RuleEngine};
pub use state_machine::{StateMachine, TransitionPlan, TransitionTarget};
pub use view_generator::ViewStructureGenerator;
pub use workflow_registry::WorkflowRegistry;
