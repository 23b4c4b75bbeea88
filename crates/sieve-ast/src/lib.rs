//! Sieve syntax tree
//!
//! This crate defines the tree a Sieve parser hands to the compiler. The
//! compiler never sees surface syntax: tags are stored without their leading
//! colon, numbers are already scaled by their `K`/`M`/`G` quantifier and
//! string escapes are already resolved.
//!
//! # Modules
//!
//! - `ast`: node types (scripts, commands, tests, arguments)
//! - `builder`: fluent constructors used by embedders and tests

pub mod ast;
pub mod builder;

// Re-export commonly used items
pub use ast::{Argument, ArgumentValue, Command, Script, Test, Tests};
pub use builder::{command, test};
