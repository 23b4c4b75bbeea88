//! `fileinto`

use super::command_extension;
use crate::compiler::generator::Generator;
use crate::compiler::grammar::{arg, ArgKind, ArgSpec, Arity, CommandDef};
use crate::compiler::tree::ValidatedCommand;
use crate::compiler::validator::Validator;
use crate::error::{CompileError, RuntimeError};
use crate::extension::{ExtId, ExtensionDef, OperationDef};
use crate::opcode::OperandLayout;
use crate::result::Action;
use crate::vm::RuntimeEnv;

pub const OP_FILEINTO: u8 = 0;

static FOLDER: [ArgSpec; 1] = [arg("folder", ArgKind::String)];

pub static FILEINTO_COMMAND: CommandDef = CommandDef {
    identifier: "fileinto",
    arity: Arity::fixed(&FOLDER),
    validate: Some(validate_fileinto),
    generate: Some(generate_fileinto),
    ..CommandDef::COMMAND
};

static OPERATIONS: [OperationDef; 1] = [OperationDef {
    mnemonic: "FILEINTO",
    code: OP_FILEINTO,
    layout: OperandLayout::new(1, true),
    execute: execute_fileinto,
}];

pub static FILEINTO: ExtensionDef = ExtensionDef {
    name: "fileinto",
    validator_load: load,
    operations: &OPERATIONS,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_command(Some(ext), &FILEINTO_COMMAND);
    true
}

fn validate_fileinto(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    match cmd.operands.first().and_then(|a| a.as_literal()) {
        Some(folder) if folder.is_empty() => {
            v.error(cmd.line, "fileinto: the folder name must not be empty");
            false
        }
        _ => true,
    }
}

fn generate_fileinto(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_extension_command(command_extension(cmd)?, OP_FILEINTO, cmd)
}

fn execute_fileinto(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let mailbox = env.read_string(address)?;
    let opts = env.read_core_optionals(address)?;
    if mailbox.is_empty() {
        return Err(RuntimeError::Failure(
            "fileinto: the folder name must not be empty".to_string(),
        ));
    }
    env.add_action(env.op_address, Action::FileInto { mailbox }, opts.action_options())
}
