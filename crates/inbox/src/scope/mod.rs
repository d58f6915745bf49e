//! Scope matching
//!
//! Decides whether a notification belongs to a user-defined scope and how
//! it should be delivered. Evaluation is purely local.

mod matcher;
mod pattern;

pub use matcher::{
    CompiledScope, Delivery, delivery_for, is_in_quiet_hours, is_quiet_now, matches,
    rule_matches,
};
pub use pattern::{Pattern, glob_matches};
