//! Sieve compiler and bytecode virtual machine
//!
//! This crate turns a Sieve syntax tree into a compact binary program and
//! runs that program against incoming messages. The grammar is extensible:
//! every command, test, tag, comparator, match type and address part is
//! registered by either the core language or an extension, and the same
//! extension definitions drive validation, code generation, execution and
//! disassembly.
//!
//! # Architecture
//!
//! - The validator resolves each syntax tree node against the registered
//!   grammar and activates extensions named by `require`.
//! - The generator emits a flat, stack-less program with forward jumps.
//! - The interpreter decodes one operation at a time and dispatches into
//!   core handlers or the owning extension's table.
//! - Tests funnel through a single matching driver parameterized by a
//!   comparator, a match type and an address part.
//!
//! # Modules
//!
//! - `address`: RFC 2822 address list parsing for address tests
//! - `clock`: wall clock abstraction
//! - `code`: disassembler, load-time verification and binary dumps
//! - `commands`: core commands and tests
//! - `compiler`: validator, generator and diagnostics
//! - `engine`: facade bundling registry, settings and clock
//! - `error`: error types and execution status codes
//! - `extension`: extension definitions and the registry
//! - `extensions`: built-in extensions
//! - `message`: message, envelope and header editing collaborators
//! - `objects`: comparators, match types, address parts, side effects
//! - `opcode`: operation and operand encoding tables
//! - `result`: recorded actions and their commit
//! - `settings`: runtime configuration
//! - `trace`: execution trace side channel
//! - `vm`: interpreter and runtime environment

#![allow(clippy::result_large_err)]

pub mod address;
pub mod clock;
pub mod code;
pub mod commands;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod extension;
pub mod extensions;
pub mod message;
pub mod objects;
pub mod opcode;
pub mod result;
pub mod settings;
pub mod trace;
pub mod vm;

// Re-export main types
pub use clock::{Clock, SystemClock};
pub use code::{BinaryDump, Disassembler};
pub use compiler::{compile, Diagnostic, Diagnostics, Severity};
pub use engine::Engine;
pub use error::{CompileError, ExecStatus, RuntimeError};
pub use extension::{ExtId, ExtensionDef, ExtensionRegistry};
pub use message::{EnvelopePart, HeaderEditor, MessageContext, MessageError, MessageSource};
pub use result::{Action, ActionError, ActionHandler, ActionRecord, ScriptResult};
pub use settings::Settings;
pub use trace::{TraceBuffer, TraceLevel, Tracer};
pub use vm::{Interpreter, InterpreterState};

#[cfg(test)]
mod tests;
