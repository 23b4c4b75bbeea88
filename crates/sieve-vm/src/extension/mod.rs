//! Extension model
//!
//! An extension is an immutable, process-lifetime [`ExtensionDef`]: a set of
//! hooks into the validator, the generator and the interpreter, plus the
//! operations, operands and capability objects it contributes. Definitions
//! are registered once in an [`ExtensionRegistry`] and identified by
//! [`ExtId`] from then on.

pub mod registry;

pub use registry::ExtensionRegistry;

use crate::compiler::generator::Generator;
use crate::compiler::validator::Validator;
use crate::error::{CompileError, RuntimeError};
use crate::objects::{Object, ObjectClass};
use crate::opcode::OperandLayout;
use crate::vm::env::RuntimeEnv;
use crate::vm::Interpreter;
use sieve_binary::{Binary, CodeError, CodeReader};
use std::fmt;
use std::path::Path;

/// Registry-assigned extension identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtId(pub usize);

impl fmt::Display for ExtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execute hook: decodes the operands at `address` and advances past them
pub type ExecuteFn = fn(&mut RuntimeEnv<'_, '_>, &mut usize) -> Result<(), RuntimeError>;

/// An operation contributed by an extension
pub struct OperationDef {
    pub mnemonic: &'static str,
    /// Code byte following the extension prefix
    pub code: u8,
    pub layout: OperandLayout,
    pub execute: ExecuteFn,
}

impl fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDef")
            .field("mnemonic", &self.mnemonic)
            .field("code", &self.code)
            .field("layout", &self.layout)
            .finish()
    }
}

/// A custom operand kind contributed by an extension
///
/// Custom operands are encoded as `CUSTOM <ext index> <code> <data>`; the
/// extension decodes `<data>`.
pub struct OperandDef {
    pub name: &'static str,
    pub code: u8,
    /// Evaluate the operand as a string
    pub read_string: fn(&mut RuntimeEnv<'_, '_>, ExtId, &mut usize) -> Result<String, RuntimeError>,
    /// Render the operand data for the disassembler
    pub describe: fn(CodeReader<'_>, &mut usize) -> Result<String, CodeError>,
}

impl fmt::Debug for OperandDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperandDef")
            .field("name", &self.name)
            .field("code", &self.code)
            .finish()
    }
}

pub struct ExtensionDef {
    /// Capability name used by `require`
    pub name: &'static str,
    pub version: u32,
    /// Loaded automatically, never named by `require`
    pub implicit: bool,

    // ===== Validator =====
    /// Register commands, tags and objects; false aborts the `require`
    pub validator_load: fn(&mut Validator<'_>, ExtId) -> bool,
    /// Whether `this` cannot be active together with `other`
    pub conflicts: fn(this: &ExtensionDef, other: &ExtensionDef) -> bool,

    // ===== Generator =====
    /// Runs after the main program is generated, e.g. to write a block
    pub generator_finish: Option<fn(&mut Generator<'_>, ExtId) -> Result<(), CompileError>>,

    // ===== Interpreter =====
    pub interpreter_load: Option<fn(&mut Interpreter<'_>, ExtId) -> Result<(), RuntimeError>>,
    pub operations: &'static [OperationDef],
    pub operands: &'static [OperandDef],
    pub objects: fn(ObjectClass, u8) -> Option<Object>,

    // ===== Binary =====
    pub pre_save: Option<fn(&Binary) -> Result<(), String>>,
    pub post_save: Option<fn(&Binary, &Path)>,
    /// Render the extension's own block in dumps
    pub dump_block: Option<fn(&[u8], &mut dyn fmt::Write) -> fmt::Result>,
}

fn load_nothing(_validator: &mut Validator<'_>, _ext: ExtId) -> bool {
    true
}

fn never_conflicts(_this: &ExtensionDef, _other: &ExtensionDef) -> bool {
    false
}

fn no_objects(_class: ObjectClass, _code: u8) -> Option<Object> {
    None
}

impl ExtensionDef {
    /// Definition without any hooks, for struct update syntax
    pub const EMPTY: ExtensionDef = ExtensionDef {
        name: "",
        version: 1,
        implicit: false,
        validator_load: load_nothing,
        conflicts: never_conflicts,
        generator_finish: None,
        interpreter_load: None,
        operations: &[],
        operands: &[],
        objects: no_objects,
        pre_save: None,
        post_save: None,
        dump_block: None,
    };

    pub fn operation(&self, code: u8) -> Option<&'static OperationDef> {
        let operations: &'static [OperationDef] = self.operations;
        operations.iter().find(|op| op.code == code)
    }

    pub fn operand(&self, code: u8) -> Option<&'static OperandDef> {
        let operands: &'static [OperandDef] = self.operands;
        operands.iter().find(|op| op.code == code)
    }
}

impl fmt::Debug for ExtensionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDef")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("implicit", &self.implicit)
            .finish()
    }
}
