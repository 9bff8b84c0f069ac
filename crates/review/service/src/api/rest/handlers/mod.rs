//! API request handlers

mod health;
mod instances;
mod rules;
mod transition;
mod view;
mod workflows;

pub use health::*;
pub use instances::*;
pub use rules::*;
pub use transition::*;
pub use view::*;
pub use workflows::*;
