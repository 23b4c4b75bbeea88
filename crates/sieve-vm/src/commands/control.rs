//! Control structures and logical tests

use crate::compiler::generator::Generator;
use crate::compiler::grammar::{
    arg, ArgKind, ArgSpec, Arity, BlockPolicy, CommandDef, Flow, SubTests,
};
use crate::compiler::tree::ValidatedCommand;
use crate::compiler::validator::Validator;
use crate::error::CompileError;
use crate::opcode::OpCode;

static CAPABILITIES: [ArgSpec; 1] = [arg("capabilities", ArgKind::LiteralList)];

pub static REQUIRE: CommandDef = CommandDef {
    identifier: "require",
    flow: Flow::Require,
    arity: Arity::fixed(&CAPABILITIES),
    leading: true,
    validate: Some(validate_require),
    ..CommandDef::COMMAND
};

pub static IF: CommandDef = CommandDef {
    identifier: "if",
    flow: Flow::If,
    subtests: SubTests::Single,
    block: BlockPolicy::Required,
    ..CommandDef::COMMAND
};

pub static ELSIF: CommandDef = CommandDef {
    identifier: "elsif",
    flow: Flow::Elsif,
    subtests: SubTests::Single,
    block: BlockPolicy::Required,
    follows: &["if", "elsif"],
    ..CommandDef::COMMAND
};

pub static ELSE: CommandDef = CommandDef {
    identifier: "else",
    flow: Flow::Else,
    block: BlockPolicy::Required,
    follows: &["if", "elsif"],
    ..CommandDef::COMMAND
};

pub static STOP: CommandDef = CommandDef {
    identifier: "stop",
    generate: Some(generate_stop),
    ..CommandDef::COMMAND
};

pub static TRUE: CommandDef = CommandDef {
    identifier: "true",
    flow: Flow::True,
    ..CommandDef::TEST
};

pub static FALSE: CommandDef = CommandDef {
    identifier: "false",
    flow: Flow::False,
    ..CommandDef::TEST
};

pub static NOT: CommandDef = CommandDef {
    identifier: "not",
    flow: Flow::Not,
    subtests: SubTests::Single,
    ..CommandDef::TEST
};

pub static ANYOF: CommandDef = CommandDef {
    identifier: "anyof",
    flow: Flow::AnyOf,
    subtests: SubTests::List,
    ..CommandDef::TEST
};

pub static ALLOF: CommandDef = CommandDef {
    identifier: "allof",
    flow: Flow::AllOf,
    subtests: SubTests::List,
    ..CommandDef::TEST
};

pub(crate) fn register(v: &mut Validator<'_>) {
    for def in [&REQUIRE, &IF, &ELSIF, &ELSE, &STOP, &TRUE, &FALSE, &NOT, &ANYOF, &ALLOF] {
        v.register_command(None, def);
    }
}

fn validate_require(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let names: Vec<String> = cmd
        .operands
        .first()
        .map(|list| list.literals().into_iter().map(str::to_string).collect())
        .unwrap_or_default();

    let mut ok = true;
    for name in names {
        ok &= v.require_extension(&name, cmd.line);
    }
    ok
}

fn generate_stop(g: &mut Generator<'_>, _cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core(OpCode::Stop);
    Ok(())
}
