//! Review service library
//!
//! HTTP surface for the review workflow engine:
//! - REST API under `/api/v1` for views, transitions, rules, workflows and instances
//! - Bootstrap catalog loading
//! - Server lifecycle management

#![deny(unsafe_code)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod server;

pub use catalog::Catalog;
pub use config::ServiceConfig;
pub use error::{ApiError, ServiceError};
pub use server::Server;
