//! Core commands and tests
//!
//! # Modules
//!
//! - `control`: `require`, `if`/`elsif`/`else`, `stop` and the logical tests
//! - `actions`: `keep`, `discard`, `redirect`
//! - `conditions`: `address`, `header`, `exists`, `size`
//! - `match_args`: comparator, match type and address part tags shared by
//!   every matching test, core or extension

pub mod actions;
pub mod conditions;
pub mod control;
pub mod match_args;

use crate::compiler::validator::Validator;

/// Register the core grammar into a fresh validator
pub fn register_core(v: &mut Validator<'_>) {
    control::register(v);
    actions::register(v);
    conditions::register(v);
    match_args::register_core_objects(v);
}
