//! `envelope`
//!
//! Matches the SMTP envelope instead of header fields. Envelope values are
//! single paths, so they are parsed with [`parse_path`] rather than as
//! address lists. The null return path matches as the empty string under
//! `:all` and is skipped by every other address part.

use super::command_extension;
use crate::address::parse_path;
use crate::commands::match_args::register_match_tags;
use crate::compiler::generator::Generator;
use crate::compiler::grammar::{arg, ArgKind, ArgSpec, Arity, CommandDef};
use crate::compiler::tree::{ArgValue, ValidatedCommand};
use crate::compiler::validator::Validator;
use crate::error::{CompileError, RuntimeError};
use crate::extension::{ExtId, ExtensionDef, OperationDef};
use crate::message::EnvelopePart;
use crate::objects::{address_part, AddressPart};
use crate::opcode::OperandLayout;
use crate::vm::matching::match_values;
use crate::vm::RuntimeEnv;

pub const OP_ENVELOPE: u8 = 0;

static PARTS_AND_KEYS: [ArgSpec; 2] = [
    arg("envelope part", ArgKind::StringList),
    arg("key list", ArgKind::StringList),
];

pub static ENVELOPE_TEST: CommandDef = CommandDef {
    identifier: "envelope",
    arity: Arity::fixed(&PARTS_AND_KEYS),
    validate: Some(validate_envelope),
    generate: Some(generate_envelope),
    ..CommandDef::TEST
};

static OPERATIONS: [OperationDef; 1] = [OperationDef {
    mnemonic: "ENVELOPE",
    code: OP_ENVELOPE,
    layout: OperandLayout::new(2, true),
    execute: execute_envelope,
}];

pub static ENVELOPE: ExtensionDef = ExtensionDef {
    name: "envelope",
    validator_load: load,
    operations: &OPERATIONS,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_command(Some(ext), &ENVELOPE_TEST);
    register_match_tags(v, "envelope", Some(ext), true);
    true
}

fn validate_envelope(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let unknown: Vec<String> = cmd
        .operands
        .first()
        .map(ArgValue::literals)
        .unwrap_or_default()
        .into_iter()
        .filter(|part| EnvelopePart::from_name(part).is_none())
        .map(str::to_string)
        .collect();

    for part in &unknown {
        v.error(
            cmd.line,
            format!("specified envelope part '{}' is not supported by the envelope test", part),
        );
    }
    unknown.is_empty()
}

fn generate_envelope(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_extension_command(command_extension(cmd)?, OP_ENVELOPE, cmd)
}

fn execute_envelope(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let op_address = env.op_address;
    let parts = env.read_string_list(address)?;
    let keys = env.read_string_list(address)?;
    let opts = env.read_core_optionals(address)?;
    env.trace_test(op_address, format_args!("envelope test on {:?}", parts));

    let part_extractor = opts.address_part();
    let separator = env.settings.subaddress_separator.clone();
    let mut values = Vec::new();
    for name in &parts {
        let Some(part) = EnvelopePart::from_name(name) else {
            tracing::debug!(part = %name, "skipping unknown envelope part");
            continue;
        };
        if let Some(path) = env.message.envelope(part)? {
            values.extend(envelope_values(part_extractor, &path, &separator));
        }
    }

    let result = match_values(env, opts.comparator(), opts.match_type(), &values, &keys);
    env.set_test_result(op_address, result);
    Ok(())
}

/// Address part of one envelope path
fn envelope_values(part: &dyn AddressPart, path: &str, separator: &str) -> Option<String> {
    let is_all = part.identifier() == address_part::ALL.identifier();
    let path = path.trim();
    if path.is_empty() || path == "<>" {
        return is_all.then(String::new);
    }
    match parse_path(path) {
        Some(addr) => part.extract(&addr, separator),
        None if is_all => Some(path.to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_path_only_under_all() {
        assert_eq!(envelope_values(&address_part::ALL, "", "+"), Some(String::new()));
        assert_eq!(envelope_values(&address_part::ALL, "<>", "+"), Some(String::new()));
        assert_eq!(envelope_values(&address_part::DOMAIN, "", "+"), None);
    }

    #[test]
    fn test_envelope_path_parts() {
        assert_eq!(
            envelope_values(&address_part::DOMAIN, "<bob+tag@example.org>", "+"),
            Some("example.org".to_string())
        );
        assert_eq!(
            envelope_values(&address_part::USER, "bob+tag@example.org", "+"),
            Some("bob".to_string())
        );
    }
}
