//! `editheader`
//!
//! `addheader` and `deleteheader` modify the message through the
//! pipeline's [`HeaderEditor`](crate::message::HeaderEditor). Protected
//! fields are rejected when the name is known at compile time and again at
//! runtime. Running either command against a message without an editor is
//! a script failure.

use super::{command_extension, read_flag};
use crate::commands::conditions::is_valid_header_name;
use crate::commands::match_args::register_match_tags;
use crate::compiler::generator::Generator;
use crate::compiler::grammar::{arg, ArgKind, ArgSpec, Arity, CommandDef, TagCall, TagDef, TagKind};
use crate::compiler::tree::{ArgValue, ValidatedCommand};
use crate::compiler::validator::Validator;
use crate::error::{CompileError, RuntimeError};
use crate::extension::{ExtId, ExtensionDef, OperationDef};
use crate::message::HeaderEditor;
use crate::opcode::{OperandLayout, OPT_CUSTOM};
use crate::settings::Settings;
use crate::trace::TraceLevel;
use crate::vm::matching::match_values;
use crate::vm::RuntimeEnv;

pub const OP_ADDHEADER: u8 = 0;
pub const OP_DELETEHEADER: u8 = 1;

/// `addheader :last`
pub const OPT_ADD_LAST: u8 = OPT_CUSTOM;
/// `deleteheader :index <n>`
pub const OPT_DELETE_INDEX: u8 = OPT_CUSTOM;
/// `deleteheader :last`
pub const OPT_DELETE_LAST: u8 = OPT_CUSTOM + 1;

static NAME_AND_VALUE: [ArgSpec; 2] = [
    arg("field name", ArgKind::String),
    arg("value", ArgKind::String),
];

static NAME: [ArgSpec; 1] = [arg("field name", ArgKind::String)];
static VALUE_PATTERNS: [ArgSpec; 1] = [arg("value patterns", ArgKind::StringList)];

pub static ADDHEADER_COMMAND: CommandDef = CommandDef {
    identifier: "addheader",
    arity: Arity::fixed(&NAME_AND_VALUE),
    validate: Some(validate_addheader),
    generate: Some(generate_addheader),
    ..CommandDef::COMMAND
};

pub static DELETEHEADER_COMMAND: CommandDef = CommandDef {
    identifier: "deleteheader",
    arity: Arity::trailing(&NAME, &VALUE_PATTERNS),
    validate: Some(validate_deleteheader),
    generate: Some(generate_deleteheader),
    ..CommandDef::COMMAND
};

static LAST_TAG: TagDef = TagDef::flag("last");

static INDEX_TAG: TagDef = TagDef {
    kind: TagKind::Normal("index"),
    allow_multiple: false,
    validate: Some(validate_index_tag),
    validate_persistent: None,
};

static OPERATIONS: [OperationDef; 2] = [
    OperationDef {
        mnemonic: "ADDHEADER",
        code: OP_ADDHEADER,
        layout: OperandLayout::new(2, true),
        execute: execute_addheader,
    },
    OperationDef {
        mnemonic: "DELETEHEADER",
        code: OP_DELETEHEADER,
        layout: OperandLayout::new(2, true),
        execute: execute_deleteheader,
    },
];

pub static EDITHEADER: ExtensionDef = ExtensionDef {
    name: "editheader",
    validator_load: load,
    operations: &OPERATIONS,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_command(Some(ext), &ADDHEADER_COMMAND);
    v.register_tag("addheader", Some(ext), &LAST_TAG, OPT_ADD_LAST);

    v.register_command(Some(ext), &DELETEHEADER_COMMAND);
    v.register_tag("deleteheader", Some(ext), &INDEX_TAG, OPT_DELETE_INDEX);
    v.register_tag("deleteheader", Some(ext), &LAST_TAG, OPT_DELETE_LAST);
    register_match_tags(v, "deleteheader", Some(ext), false);
    true
}

// ===== Validation =====

/// Why a field name cannot be edited, if it cannot
fn field_name_problem(settings: &Settings, name: &str) -> Option<&'static str> {
    if !is_valid_header_name(name) {
        Some("is invalid")
    } else if settings.editheader_is_protected(name) {
        Some("is protected")
    } else {
        None
    }
}

/// Why a field value cannot be added, if it cannot
fn field_value_problem(settings: &Settings, value: &str) -> Option<String> {
    if value.len() > settings.editheader_max_header_size {
        return Some(format!(
            "exceeds the maximum header size of {} bytes",
            settings.editheader_max_header_size
        ));
    }
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Some("contains control characters".to_string());
    }
    None
}

fn check_literal_field_name(v: &mut Validator<'_>, cmd: &ValidatedCommand) -> bool {
    let Some(name) = cmd.operands.first().and_then(ArgValue::as_literal) else {
        return true;
    };
    match field_name_problem(v.settings(), name) {
        Some(problem) => {
            let message = format!(
                "{}: specified header field name '{}' {}",
                cmd.identifier(),
                name,
                problem
            );
            v.error(cmd.line, message);
            false
        }
        None => true,
    }
}

fn validate_addheader(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let mut ok = check_literal_field_name(v, cmd);
    if let Some(value) = cmd.operands.get(1).and_then(ArgValue::as_literal) {
        if let Some(problem) = field_value_problem(v.settings(), value) {
            v.error(cmd.line, format!("addheader: specified header value {}", problem));
            ok = false;
        }
    }
    ok
}

fn validate_index_tag(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> bool {
    let Some(index) = v.tag_number_argument(call, "field index") else {
        return false;
    };
    if index == 0 {
        v.error(call.line, "deleteheader: the :index tag requires a field index of at least 1");
        return false;
    }
    call.value = ArgValue::Number(index);
    true
}

fn validate_deleteheader(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let mut ok = check_literal_field_name(v, cmd);
    if cmd.has_tag("last") && !cmd.has_tag("index") {
        v.error(cmd.line, "deleteheader: the :last tag requires the :index tag");
        ok = false;
    }
    ok
}

fn generate_addheader(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_extension_command(command_extension(cmd)?, OP_ADDHEADER, cmd)
}

fn generate_deleteheader(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_extension_command(command_extension(cmd)?, OP_DELETEHEADER, cmd)
}

// ===== Execution =====

fn editor<'e>(env: &'e mut RuntimeEnv<'_, '_>, command: &str) -> Result<&'e mut dyn HeaderEditor, RuntimeError> {
    env.message
        .editor()
        .ok_or_else(|| RuntimeError::Failure(format!("{}: the message cannot be modified", command)))
}

fn check_runtime_field_name(env: &RuntimeEnv<'_, '_>, command: &str, name: &str) -> Result<(), RuntimeError> {
    match field_name_problem(env.settings, name) {
        Some(problem) => Err(RuntimeError::Failure(format!(
            "{}: specified header field name '{}' {}",
            command, name, problem
        ))),
        None => Ok(()),
    }
}

fn execute_addheader(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let op_address = env.op_address;
    let name = env.read_string(address)?;
    let value = env.read_string(address)?;
    let mut last = false;
    env.read_optionals(address, |env, code, at| match code {
        OPT_ADD_LAST => {
            last = true;
            read_flag(env, at)
        }
        _ => Err(RuntimeError::corrupt(
            *at - 1,
            format!("unexpected optional operand code {}", code),
        )),
    })?;

    check_runtime_field_name(env, "addheader", &name)?;
    if let Some(problem) = field_value_problem(env.settings, &value) {
        return Err(RuntimeError::Failure(format!(
            "addheader: specified header value {}",
            problem
        )));
    }

    editor(env, "addheader")?.add_header(&name, &value, last)?;
    env.trace.line(
        TraceLevel::Actions,
        Some(op_address),
        format_args!(
            "addheader{} \"{}\" \"{}\"",
            if last { " :last" } else { "" },
            name,
            value
        ),
    );
    Ok(())
}

fn execute_deleteheader(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let op_address = env.op_address;
    let name = env.read_string(address)?;
    let patterns = env.read_optional_string_list(address)?;
    let mut index: Option<u64> = None;
    let mut last = false;
    let opts = env.read_optionals(address, |env, code, at| match code {
        OPT_DELETE_INDEX => {
            index = Some(env.read_number(at)?);
            Ok(())
        }
        OPT_DELETE_LAST => {
            last = true;
            read_flag(env, at)
        }
        _ => Err(RuntimeError::corrupt(
            *at - 1,
            format!("unexpected optional operand code {}", code),
        )),
    })?;

    check_runtime_field_name(env, "deleteheader", &name)?;

    let values = env.message.header_values(&name)?;
    let count = values.len();
    // 1-based occurrence numbers, counted from the top
    let candidates: Vec<usize> = match index {
        Some(n) => usize::try_from(n)
            .ok()
            .filter(|n| *n >= 1 && *n <= count)
            .map(|n| if last { count + 1 - n } else { n })
            .into_iter()
            .collect(),
        None => (1..=count).collect(),
    };

    let mut doomed = Vec::new();
    for occurrence in candidates {
        let matched = match &patterns {
            None => true,
            Some(keys) => {
                let value = [values[occurrence - 1].clone()];
                match_values(env, opts.comparator(), opts.match_type(), &value, keys)
            }
        };
        if matched {
            doomed.push(occurrence);
        }
    }

    env.trace.line(
        TraceLevel::Actions,
        Some(op_address),
        format_args!("deleteheader \"{}\": {} of {} occurrence(s)", name, doomed.len(), count),
    );
    if doomed.is_empty() {
        return Ok(());
    }

    let editor = editor(env, "deleteheader")?;
    if doomed.len() == count && index.is_none() {
        editor.delete_header(&name, None)?;
    } else {
        // bottom-up so earlier occurrence numbers stay valid
        for occurrence in doomed.into_iter().rev() {
            editor.delete_header(&name, Some(occurrence))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_problems() {
        let settings = Settings::default();
        assert_eq!(field_name_problem(&settings, "X-Filtered"), None);
        assert_eq!(field_name_problem(&settings, "Received"), Some("is protected"));
        assert_eq!(field_name_problem(&settings, "bad name"), Some("is invalid"));
    }

    #[test]
    fn test_field_value_problems() {
        let settings = Settings {
            editheader_max_header_size: 8,
            ..Settings::default()
        };
        assert!(field_value_problem(&settings, "ok\tvalue").is_none());
        assert!(field_value_problem(&settings, "far too long").is_some());
        assert!(field_value_problem(&settings, "a\r\nb").is_some());
    }
}
