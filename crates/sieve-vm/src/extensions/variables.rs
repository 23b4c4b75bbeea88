//! `variables`
//!
//! Variables are numbered at compile time in order of first use, either
//! as the target of `set` or inside a `${name}` reference. Names compare
//! case-insensitively. A string that contains references is compiled into
//! a catenated string whose variable and match value parts are custom
//! operands of this extension.
//!
//! The variable names are written to the extension's own block so that
//! dumps can show them; execution only needs the indexes. Values live in a
//! per-run context and start out empty.

use super::command_extension;
use crate::commands::match_args::register_match_tags;
use crate::compiler::generator::Generator;
use crate::compiler::grammar::{arg, ArgKind, ArgSpec, Arity, CommandDef, TagCall, TagDef, TagKind};
use crate::compiler::tree::{ArgValue, StringExpr, StringPart, ValidatedCommand};
use crate::compiler::validator::Validator;
use crate::error::{CompileError, RuntimeError};
use crate::extension::{ExtId, ExtensionDef, OperandDef, OperationDef};
use crate::opcode::{OperandLayout, OPT_CUSTOM};
use crate::trace::TraceLevel;
use crate::vm::matching::match_values;
use crate::vm::{Interpreter, RuntimeEnv};
use sieve_binary::{CodeError, CodeReader};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

pub const OP_SET: u8 = 0;
pub const OP_STRING: u8 = 1;

/// Custom operand: variable by index
pub const OPERAND_VARIABLE: u8 = 0;
/// Custom operand: match value by index
pub const OPERAND_MATCH_VALUE: u8 = 1;

/// Optional operand code of a `set` modifier
pub const OPT_MODIFIER: u8 = OPT_CUSTOM;

/// Highest index a `${N}` reference may use
pub const MAX_MATCH_VALUE_INDEX: u32 = 255;

// ===== Modifiers =====

/// `set` modifiers, applied from the highest precedence down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Modifier {
    Lower = 0,
    Upper = 1,
    LowerFirst = 2,
    UpperFirst = 3,
    QuoteWildcard = 4,
    Length = 5,
}

impl Modifier {
    pub const ALL: [Modifier; 6] = [
        Modifier::Lower,
        Modifier::Upper,
        Modifier::LowerFirst,
        Modifier::UpperFirst,
        Modifier::QuoteWildcard,
        Modifier::Length,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| *m as u64 == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Lower => "lower",
            Modifier::Upper => "upper",
            Modifier::LowerFirst => "lowerfirst",
            Modifier::UpperFirst => "upperfirst",
            Modifier::QuoteWildcard => "quotewildcard",
            Modifier::Length => "length",
        }
    }

    /// Modifiers of equal precedence cannot be combined
    pub fn precedence(self) -> u8 {
        match self {
            Modifier::Lower | Modifier::Upper => 40,
            Modifier::LowerFirst | Modifier::UpperFirst => 30,
            Modifier::QuoteWildcard => 20,
            Modifier::Length => 10,
        }
    }

    pub fn apply(self, value: &str) -> String {
        match self {
            Modifier::Lower => value.to_lowercase(),
            Modifier::Upper => value.to_uppercase(),
            Modifier::LowerFirst => map_first(value, char::to_lowercase),
            Modifier::UpperFirst => map_first(value, char::to_uppercase),
            Modifier::QuoteWildcard => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    if matches!(c, '*' | '?' | '\\') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out
            }
            Modifier::Length => value.chars().count().to_string(),
        }
    }
}

fn map_first<I>(value: &str, map: fn(char) -> I) -> String
where
    I: Iterator<Item = char>,
{
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => map(first).chain(chars).collect(),
        None => String::new(),
    }
}

/// Apply modifiers in precedence order
pub fn apply_modifiers(modifiers: &[Modifier], value: String) -> String {
    let mut ordered = modifiers.to_vec();
    ordered.sort_by_key(|m| Reverse(m.precedence()));
    ordered.into_iter().fold(value, |acc, m| m.apply(&acc))
}

// ===== Variable names and references =====

/// Whether `name` is a valid variable identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
    MatchValue(u32),
}

/// Split a string at its `${...}` references; invalid references stay
/// literal text
fn split_references(value: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(found) = value[pos..].find("${") {
        let open = pos + found;
        let body_start = open + 2;
        let Some(close) = value[body_start..].find('}').map(|i| body_start + i) else {
            break;
        };
        match reference(&value[body_start..close]) {
            Some(segment) => {
                if literal_start < open {
                    out.push(Segment::Literal(&value[literal_start..open]));
                }
                out.push(segment);
                pos = close + 1;
                literal_start = pos;
            }
            None => pos = open + 1,
        }
    }

    if literal_start < value.len() {
        out.push(Segment::Literal(&value[literal_start..]));
    }
    out
}

fn reference(body: &str) -> Option<Segment<'_>> {
    if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) {
        return body
            .parse::<u32>()
            .ok()
            .filter(|n| *n <= MAX_MATCH_VALUE_INDEX)
            .map(Segment::MatchValue);
    }
    is_identifier(body).then_some(Segment::Variable(body))
}

/// Compile-time variable table
#[derive(Debug, Default)]
pub struct VariableScope {
    names: Vec<String>,
    index: HashMap<String, u32>,
}

impl VariableScope {
    pub fn get(&self, name: &str) -> Option<u32> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    /// Index of `name`, declaring it when new; `None` once `max` variables
    /// exist
    pub fn declare(&mut self, name: &str, max: usize) -> Option<u32> {
        let key = name.to_ascii_lowercase();
        if let Some(index) = self.index.get(&key) {
            return Some(*index);
        }
        if self.names.len() >= max {
            return None;
        }
        let index = u32::try_from(self.names.len()).ok()?;
        self.names.push(key.clone());
        self.index.insert(key, index);
        Some(index)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Variable values of one run
#[derive(Debug, Default)]
pub struct VariableStore {
    values: Vec<String>,
}

impl VariableStore {
    pub fn get(&self, index: usize) -> &str {
        self.values.get(index).map_or("", String::as_str)
    }

    pub fn set(&mut self, index: usize, value: String) {
        if self.values.len() <= index {
            self.values.resize(index + 1, String::new());
        }
        self.values[index] = value;
    }
}

// ===== Definitions =====

static NAME_AND_VALUE: [ArgSpec; 2] = [arg("name", ArgKind::Literal), arg("value", ArgKind::String)];

static SOURCE_AND_KEYS: [ArgSpec; 2] = [
    arg("source", ArgKind::StringList),
    arg("key list", ArgKind::StringList),
];

pub static SET_COMMAND: CommandDef = CommandDef {
    identifier: "set",
    arity: Arity::fixed(&NAME_AND_VALUE),
    validate: Some(validate_set),
    generate: Some(generate_set),
    ..CommandDef::COMMAND
};

pub static STRING_TEST: CommandDef = CommandDef {
    identifier: "string",
    arity: Arity::fixed(&SOURCE_AND_KEYS),
    generate: Some(generate_string),
    ..CommandDef::TEST
};

static MODIFIER_TAG: TagDef = TagDef {
    kind: TagKind::Instanced(is_modifier),
    allow_multiple: true,
    validate: Some(validate_modifier),
    validate_persistent: None,
};

static OPERATIONS: [OperationDef; 2] = [
    OperationDef {
        mnemonic: "SET",
        code: OP_SET,
        layout: OperandLayout::new(2, true),
        execute: execute_set,
    },
    OperationDef {
        mnemonic: "STRING",
        code: OP_STRING,
        layout: OperandLayout::new(2, true),
        execute: execute_string,
    },
];

static OPERANDS: [OperandDef; 2] = [
    OperandDef {
        name: "variable",
        code: OPERAND_VARIABLE,
        read_string: read_variable,
        describe: describe_variable,
    },
    OperandDef {
        name: "match value",
        code: OPERAND_MATCH_VALUE,
        read_string: read_match_value,
        describe: describe_match_value,
    },
];

pub static VARIABLES: ExtensionDef = ExtensionDef {
    name: "variables",
    validator_load: load,
    generator_finish: Some(write_names_block),
    interpreter_load: Some(enable_match_values),
    operations: &OPERATIONS,
    operands: &OPERANDS,
    dump_block: Some(dump_names_block),
    ..ExtensionDef::EMPTY
};

// ===== Validation =====

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_command(Some(ext), &SET_COMMAND);
    v.register_tag("set", Some(ext), &MODIFIER_TAG, OPT_MODIFIER);
    v.register_command(Some(ext), &STRING_TEST);
    register_match_tags(v, "string", Some(ext), false);
    v.register_string_handler(ext, bind_variables);
    true
}

fn is_modifier(_v: &Validator<'_>, identifier: &str) -> Option<usize> {
    Modifier::from_name(identifier).map(|m| m as usize)
}

fn validate_modifier(_v: &mut Validator<'_>, call: &mut TagCall<'_>) -> bool {
    let Some(instance) = call.instance else {
        return false;
    };
    call.value = ArgValue::Number(instance as u64);
    true
}

fn declare_variable(v: &mut Validator<'_>, ext: ExtId, name: &str, line: u32) -> Option<u32> {
    let max = v.settings().max_variables;
    let index = v.context_mut::<VariableScope>(ext).declare(name, max);
    if index.is_none() {
        v.error(
            line,
            format!("too many variables; the maximum is {} (declaring '{}')", max, name),
        );
    }
    index
}

/// String handler expanding `${...}` references
fn bind_variables(v: &mut Validator<'_>, value: &str, line: u32) -> Option<StringExpr> {
    let segments = split_references(value);
    if segments.iter().all(|s| matches!(s, Segment::Literal(_))) {
        return v.bind_string_super(value, line);
    }
    let Some(ext) = v.registry().lookup(VARIABLES.name) else {
        return v.bind_string_super(value, line);
    };

    let mut parts = Vec::with_capacity(segments.len());
    for segment in segments {
        let part = match segment {
            Segment::Literal(s) => StringPart::Literal(s.to_string()),
            Segment::MatchValue(index) => StringPart::Extension {
                ext,
                code: OPERAND_MATCH_VALUE,
                index,
            },
            Segment::Variable(name) => StringPart::Extension {
                ext,
                code: OPERAND_VARIABLE,
                index: declare_variable(v, ext, name, line)?,
            },
        };
        parts.push(part);
    }
    Some(StringExpr::Catenated(parts))
}

fn validate_set(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let Some(ext) = cmd.ext else {
        return false;
    };
    let mut ok = true;

    let modifiers: Vec<Modifier> = cmd
        .tags
        .iter()
        .filter_map(|t| t.value.as_number())
        .filter_map(Modifier::from_code)
        .collect();
    for (i, a) in modifiers.iter().enumerate() {
        for b in &modifiers[i + 1..] {
            if a.precedence() == b.precedence() {
                v.error(
                    cmd.line,
                    format!(
                        "the modifiers :{} and :{} of the set command have equal precedence and cannot be combined",
                        a.name(),
                        b.name()
                    ),
                );
                ok = false;
            }
        }
    }

    let Some(name) = cmd.operands.first().and_then(ArgValue::as_literal).map(str::to_string) else {
        return false;
    };
    if !is_identifier(&name) {
        v.error(cmd.line, format!("invalid variable name '{}'", name));
        return false;
    }
    let Some(index) = declare_variable(v, ext, &name, cmd.line) else {
        return false;
    };
    cmd.operands[0] = ArgValue::Extension {
        ext,
        code: OPERAND_VARIABLE,
        index,
    };
    ok
}

// ===== Generation =====

fn generate_set(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_extension_command(command_extension(cmd)?, OP_SET, cmd)
}

fn generate_string(g: &mut Generator<'_>, cmd: &ValidatedCommand) -> Result<(), CompileError> {
    g.emit_extension_command(command_extension(cmd)?, OP_STRING, cmd)
}

/// Write the variable names into the extension block
fn write_names_block(g: &mut Generator<'_>, ext: ExtId) -> Result<(), CompileError> {
    let names: Vec<String> = g
        .context::<VariableScope>(ext)
        .map(|scope| scope.names().to_vec())
        .unwrap_or_default();
    let block = g.create_extension_block(ext)?;
    let buf = g
        .block_mut(block)
        .ok_or_else(|| CompileError::Generation(format!("variables block {} is missing", block)))?;
    buf.emit_integer(names.len() as u64);
    for name in &names {
        buf.emit_string(name);
    }
    Ok(())
}

fn dump_names_block(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
    let code = CodeReader::new(data);
    let mut address = 0;
    let count = match code.read_count(&mut address, data.len()) {
        Ok(count) => count,
        Err(e) => return writeln!(out, "  <invalid variables block: {}>", e),
    };
    writeln!(out, "  {} variable(s)", count)?;
    for index in 0..count {
        match code.read_str(&mut address) {
            Ok(name) => writeln!(out, "  {}: {}", index, name)?,
            Err(e) => return writeln!(out, "  <invalid variables block: {}>", e),
        }
    }
    Ok(())
}

// ===== Execution =====

fn enable_match_values(interpreter: &mut Interpreter<'_>, _ext: ExtId) -> Result<(), RuntimeError> {
    interpreter.enable_match_values();
    Ok(())
}

fn variable_index(env: &RuntimeEnv<'_, '_>, address: usize, index: u64) -> Result<usize, RuntimeError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < env.settings.max_variables)
        .ok_or_else(|| RuntimeError::corrupt(address, format!("variable index {} out of range", index)))
}

/// Cut `value` to at most `max` bytes on a character boundary
fn truncate_value(mut value: String, max: usize) -> String {
    if value.len() > max {
        let mut end = max;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

fn read_variable(env: &mut RuntimeEnv<'_, '_>, ext: ExtId, address: &mut usize) -> Result<String, RuntimeError> {
    let start = *address;
    let index = env.code.read_integer(address)?;
    let index = variable_index(env, start, index)?;
    Ok(env
        .contexts
        .get::<VariableStore>(ext)
        .map(|store| store.get(index).to_string())
        .unwrap_or_default())
}

fn read_match_value(env: &mut RuntimeEnv<'_, '_>, _ext: ExtId, address: &mut usize) -> Result<String, RuntimeError> {
    let index = env.code.read_integer(address)?;
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| env.match_values.get(i))
        .unwrap_or("")
        .to_string())
}

fn describe_variable(code: CodeReader<'_>, address: &mut usize) -> Result<String, CodeError> {
    Ok(format!("#{}", code.read_integer(address)?))
}

fn describe_match_value(code: CodeReader<'_>, address: &mut usize) -> Result<String, CodeError> {
    Ok(format!("${{{}}}", code.read_integer(address)?))
}

fn execute_set(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let op_address = env.op_address;
    let target = *address;
    let (ext, code, index) = env.read_custom_operand(address)?;
    if code != OPERAND_VARIABLE {
        return Err(RuntimeError::corrupt(target, "set target is not a variable"));
    }
    let index = variable_index(env, target, index)?;
    let value = env.read_string(address)?;

    let mut modifiers = Vec::new();
    env.read_optionals(address, |env, code, at| {
        let start = *at - 1;
        if code != OPT_MODIFIER {
            return Err(RuntimeError::corrupt(
                start,
                format!("unexpected optional operand code {}", code),
            ));
        }
        let id = env.read_number(at)?;
        let modifier = Modifier::from_code(id)
            .ok_or_else(|| RuntimeError::corrupt(start, format!("unknown set modifier {}", id)))?;
        modifiers.push(modifier);
        Ok(())
    })?;

    let value = truncate_value(apply_modifiers(&modifiers, value), env.settings.max_variable_size);
    env.trace.line(
        TraceLevel::Commands,
        Some(op_address),
        format_args!("set variable #{} = \"{}\"", index, value),
    );
    env.contexts.get_or_default::<VariableStore>(ext).set(index, value);
    Ok(())
}

fn execute_string(env: &mut RuntimeEnv<'_, '_>, address: &mut usize) -> Result<(), RuntimeError> {
    let op_address = env.op_address;
    let sources = env.read_string_list(address)?;
    let keys = env.read_string_list(address)?;
    let opts = env.read_core_optionals(address)?;
    env.trace_test(op_address, format_args!("string test on {:?}", sources));

    let match_type = opts.match_type();
    // :count only counts non-empty strings
    let values: Vec<String> = if match_type.is_count() {
        sources.into_iter().filter(|s| !s.is_empty()).collect()
    } else {
        sources
    };
    let result = match_values(env, opts.comparator(), match_type, &values, &keys);
    env.set_test_result(op_address, result);
    Ok(())
}
