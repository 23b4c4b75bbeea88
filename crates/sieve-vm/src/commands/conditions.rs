//! Core tests

use super::match_args::register_match_tags;
use crate::compiler::generator::Generator;
use crate::compiler::grammar::{arg, ArgKind, ArgSpec, Arity, CommandDef, TagDef};
use crate::compiler::tree::{ArgValue, ValidatedCommand};
use crate::compiler::validator::Validator;
use crate::error::CompileError;
use crate::opcode::OpCode;

static HEADERS_AND_KEYS: [ArgSpec; 2] = [
    arg("header names", ArgKind::StringList),
    arg("key list", ArgKind::StringList),
];

static HEADERS: [ArgSpec; 1] = [arg("header names", ArgKind::StringList)];

static LIMIT: [ArgSpec; 1] = [arg("limit", ArgKind::Number)];

pub static ADDRESS: CommandDef = CommandDef {
    identifier: "address",
    arity: Arity::fixed(&HEADERS_AND_KEYS),
    validate: Some(validate_header_names),
    generate: Some(generate_address),
    ..CommandDef::TEST
};

pub static HEADER: CommandDef = CommandDef {
    identifier: "header",
    arity: Arity::fixed(&HEADERS_AND_KEYS),
    validate: Some(validate_header_names),
    generate: Some(generate_header),
    ..CommandDef::TEST
};

pub static EXISTS: CommandDef = CommandDef {
    identifier: "exists",
    arity: Arity::fixed(&HEADERS),
    validate: Some(validate_header_names),
    generate: Some(generate_exists),
    ..CommandDef::TEST
};

pub static SIZE: CommandDef = CommandDef {
    identifier: "size",
    arity: Arity::fixed(&LIMIT),
    validate: Some(validate_size),
    generate: Some(generate_size),
    ..CommandDef::TEST
};

static OVER_TAG: TagDef = TagDef::flag("over");
static UNDER_TAG: TagDef = TagDef::flag("under");

pub(crate) fn register(v: &mut Validator<'_>) {
    v.register_command(None, &ADDRESS);
    register_match_tags(v, "address", None, true);

    v.register_command(None, &HEADER);
    register_match_tags(v, "header", None, false);

    v.register_command(None, &EXISTS);

    v.register_command(None, &SIZE);
    v.register_tag("size", None, &OVER_TAG, 0);
    v.register_tag("size", None, &UNDER_TAG, 0);
}

/// Whether `name` is a syntactically valid header field name
///
/// A field name is one or more printable US-ASCII characters other than
/// the colon.
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// Check literal header names in the first operand
fn validate_header_names(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let invalid: Vec<String> = cmd
        .operands
        .first()
        .map(ArgValue::literals)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| !is_valid_header_name(name))
        .map(str::to_string)
        .collect();

    for name in &invalid {
        v.error(
            cmd.line,
            format!(
                "specified header field name '{}' for the '{}' test is invalid",
                name,
                cmd.identifier()
            ),
        );
    }
    invalid.is_empty()
}

fn validate_size(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    match (cmd.has_tag("over"), cmd.has_tag("under")) {
        (true, false) | (false, true) => true,
        (true, true) => {
            v.error(cmd.line, "the size test cannot have both the :under and the :over tag");
            false
        }
        (false, false) => {
            v.error(cmd.line, "the size test requires either the :under or the :over tag");
            false
        }
    }
}

fn generate_address(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core_command(OpCode::Address, cmd)
}

fn generate_header(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core_command(OpCode::Header, cmd)
}

fn generate_exists(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_core_command(OpCode::Exists, cmd)
}

fn generate_size(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    let op = if cmd.has_tag("over") {
        OpCode::SizeOver
    } else {
        OpCode::SizeUnder
    };
    g.emit_core_command(op, cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_name_syntax() {
        assert!(is_valid_header_name("X-Spam-Flag"));
        assert!(is_valid_header_name("subject"));
        assert!(!is_valid_header_name(""));
        assert!(!is_valid_header_name("bad name"));
        assert!(!is_valid_header_name("to:"));
        assert!(!is_valid_header_name("caf\u{e9}"));
    }
}
