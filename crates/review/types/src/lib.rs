//! Review Workflow Domain Types
//!
//! Entities submitted for onboarding (agents, vendors, products) move
//! through a configurable sequence of review and approval stages. This
//! crate holds the data model shared by the engine and the service.
//!
//! # Key Concepts
//!
//! - **WorkflowConfig**: an ordered list of [`WorkflowStep`]s for one
//!   request type, plus assignment rules, entry guards and trigger rules.
//! - **ApprovalInstance**: one entity's traversal of one config, carrying
//!   an append-only ledger of [`ApprovalStep`] records.
//! - **Rule**: a declarative condition-to-action mapping evaluated at a
//!   stage. Conditions and actions are closed tagged sets.
//! - **Layout** / **ViewStructure**: the tabs, sections and fields a stage
//!   renders, before and after permission filtering.
//!
//! Configs are validated once, when they are registered. Every other
//! component may assume the invariants hold.

#![deny(unsafe_code)]

mod condition;
mod config;
mod errors;
mod instance;
mod layout;
mod notification;
mod permission;
mod rule;
mod transition;

pub use condition::*;
pub use config::*;
pub use errors::*;
pub use instance::*;
pub use layout::*;
pub use notification::*;
pub use permission::*;
pub use rule::*;
pub use transition::*;
