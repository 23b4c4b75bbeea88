//! Core actions

use crate::address;
use crate::compiler::generator::Generator;
use crate::compiler::grammar::{arg, ArgKind, ArgSpec, Arity, CommandDef};
use crate::compiler::tree::ValidatedCommand;
use crate::compiler::validator::Validator;
use crate::error::CompileError;
use crate::opcode::OpCode;

static ADDRESS: [ArgSpec; 1] = [arg("address", ArgKind::String)];

pub static KEEP: CommandDef = CommandDef {
    identifier: "keep",
    generate: Some(generate_keep),
    ..CommandDef::COMMAND
};

pub static DISCARD: CommandDef = CommandDef {
    identifier: "discard",
    generate: Some(generate_discard),
    ..CommandDef::COMMAND
};

pub static REDIRECT: CommandDef = CommandDef {
    identifier: "redirect",
    arity: Arity::fixed(&ADDRESS),
    validate: Some(validate_redirect),
    generate: Some(generate_redirect),
    ..CommandDef::COMMAND
};

pub(crate) fn register(v: &mut Validator<'_>) {
    v.register_command(None, &KEEP);
    v.register_command(None, &DISCARD);
    v.register_command(None, &REDIRECT);
}

fn validate_redirect(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    match cmd.operands.first().and_then(|a| a.as_literal()) {
        Some(target) if !address::is_valid_mailbox(target) => {
            v.error(
                cmd.line,
                format!("specified redirect address '{}' is invalid", target),
            );
            false
        }
        _ => true,
    }
}

fn generate_keep(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core_command(OpCode::Keep, cmd)
}

fn generate_discard(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core_command(OpCode::Discard, cmd)
}

fn generate_redirect(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core_command(OpCode::Redirect, cmd)
}
