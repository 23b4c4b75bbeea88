//! Built-in extensions
//!
//! # Modules
//!
//! - `comparators`: the four comparator capabilities, two of them implicit
//! - `fileinto`: `fileinto` action
//! - `envelope`: `envelope` test
//! - `copy`: `:copy` side effect for `fileinto` and `redirect`
//! - `regex`: `:regex` match type
//! - `relational`: `:value` and `:count` match types
//! - `subaddress`: `:user` and `:detail` address parts
//! - `variables`: `set`, `string`, `${...}` substitution and match values
//! - `editheader`: `addheader` and `deleteheader`

pub mod comparators;
pub mod copy;
pub mod editheader;
pub mod envelope;
pub mod fileinto;
pub mod regex;
pub mod relational;
pub mod subaddress;
pub mod variables;

use crate::compiler::tree::ValidatedCommand;
use crate::error::{CompileError, RuntimeError};
use crate::extension::{ExtId, ExtensionDef};
use crate::opcode::OPERAND_OMITTED;
use crate::vm::RuntimeEnv;

/// Every extension a default registry carries, in registration order
pub static BUILTIN: &[&ExtensionDef] = &[
    &comparators::OCTET,
    &comparators::ASCII_CASEMAP,
    &comparators::ASCII_NUMERIC,
    &comparators::UNICODE_CASEMAP,
    &fileinto::FILEINTO,
    &envelope::ENVELOPE,
    &copy::COPY,
    &regex::REGEX,
    &relational::RELATIONAL,
    &subaddress::SUBADDRESS,
    &variables::VARIABLES,
    &editheader::EDITHEADER,
];

/// Extension that registered a validated command
pub(crate) fn command_extension(cmd: &ValidatedCommand) -> Result<ExtId, CompileError> {
    cmd.ext.ok_or_else(|| {
        CompileError::Generation(format!("'{}' is not provided by an extension", cmd.identifier()))
    })
}

/// Consume the operand of a flag optional
pub(crate) fn read_flag(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let start = *address;
    match env.code.read_byte(address)? {
        OPERAND_OMITTED => Ok(()),
        class => Err(RuntimeError::corrupt(
            start,
            format!("flag operand carries a value of class {}", class),
        )),
    }
}
