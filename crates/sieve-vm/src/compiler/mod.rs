//! Script compiler (syntax tree to binary)
//!
//! Compilation runs in two passes. The [`Validator`] resolves every node
//! against the registered grammar and produces a [`ValidatedScript`]; the
//! generator turns that tree into the main program of a new binary.
//!
//! # Modules
//!
//! - `diagnostics`: error, warning and info messages with line numbers
//! - `grammar`: command, test and tag definitions
//! - `tree`: the annotated tree shared by both passes
//! - `validator`: grammar resolution, extension activation, argument binding
//! - `generator`: code emission and jump patching

pub mod diagnostics;
pub mod generator;
pub mod grammar;
pub mod tree;
pub mod validator;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use generator::Generator;
pub use tree::{ValidatedCommand, ValidatedScript};
pub use validator::Validator;

use crate::error::CompileError;
use crate::extension::ExtensionRegistry;
use crate::settings::Settings;
use sieve_ast::Script;
use sieve_binary::{Binary, ScriptMetadata};
use std::sync::Arc;

/// Validate and generate a script in one go
///
/// On success the binary is returned together with the warnings collected
/// during validation.
pub fn compile(
    registry: &ExtensionRegistry,
    settings: &Settings,
    script: &Script,
    metadata: &ScriptMetadata,
    global_script: bool,
) -> Result<(Arc<Binary>, Diagnostics), CompileError> {
    let validated = Validator::new(registry, settings, global_script).validate(script)?;
    let diagnostics = validated.diagnostics.clone();
    let binary = generator::generate(registry, validated, metadata)?;
    Ok((binary, diagnostics))
}
