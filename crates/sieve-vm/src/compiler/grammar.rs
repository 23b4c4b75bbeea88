//! Grammar definitions
//!
//! Commands, tests and tagged arguments are described by `'static`
//! definitions registered into a [`Validator`]. Core definitions live in
//! [`crate::commands`]; extensions register theirs from their
//! `validator_load` hook.

use super::generator::Generator;
use super::tree::{ArgValue, ValidatedCommand};
use super::validator::Validator;
use crate::error::CompileError;
use sieve_ast::Argument;
use std::fmt;

/// Whether a definition is a command or a test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Command,
    Test,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Command => "command",
            CommandKind::Test => "test",
        }
    }
}

/// Control structure a definition takes part in
///
/// The generator handles every kind but [`Flow::Plain`] itself; plain
/// definitions generate through their hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Plain,
    Require,
    If,
    Elsif,
    Else,
    Not,
    AnyOf,
    AllOf,
    True,
    False,
}

/// Accepted type of a positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Number,
    /// String, bound through the active string handler
    String,
    /// String list (a single string is accepted), bound per item
    StringList,
    /// String used verbatim
    Literal,
    /// String list used verbatim
    LiteralList,
}

impl ArgKind {
    pub fn name(self) -> &'static str {
        match self {
            ArgKind::Number => "number",
            ArgKind::String | ArgKind::Literal => "string",
            ArgKind::StringList | ArgKind::LiteralList => "string list",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    /// Used in diagnostics
    pub name: &'static str,
    pub kind: ArgKind,
}

pub const fn arg(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec { name, kind }
}

/// Positional arguments of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub required: &'static [ArgSpec],
    /// Trailing arguments that may be left out
    pub optional: &'static [ArgSpec],
}

impl Arity {
    pub const NONE: Arity = Arity::fixed(&[]);

    pub const fn fixed(required: &'static [ArgSpec]) -> Self {
        Self {
            required,
            optional: &[],
        }
    }

    pub const fn trailing(required: &'static [ArgSpec], optional: &'static [ArgSpec]) -> Self {
        Self { required, optional }
    }

    /// Specification of the argument at `index`
    pub fn spec(&self, index: usize) -> Option<&'static ArgSpec> {
        let required: &'static [ArgSpec] = self.required;
        let optional: &'static [ArgSpec] = self.optional;
        required
            .get(index)
            .or_else(|| optional.get(index.checked_sub(required.len())?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubTests {
    None,
    /// Exactly one test
    Single,
    /// Parenthesized, non-empty test list
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPolicy {
    Forbidden,
    Required,
    Optional,
}

/// Checks a node after its arguments were bound; false marks it invalid
pub type ValidateFn = fn(&mut Validator<'_>, &mut ValidatedCommand) -> bool;

/// Emits the operation for a plain definition
pub type GenerateFn = fn(&mut Generator<'_>, &ValidatedCommand) -> Result<(), CompileError>;

/// Validates a tag occurrence and consumes its parameters
pub type TagValidateFn = fn(&mut Validator<'_>, &mut TagCall<'_>) -> bool;

/// Instanced tag predicate, returning data for the matching instance
pub type InstanceFn = fn(&Validator<'_>, &str) -> Option<usize>;

pub struct CommandDef {
    pub identifier: &'static str,
    pub kind: CommandKind,
    pub flow: Flow,
    pub arity: Arity,
    pub subtests: SubTests,
    pub block: BlockPolicy,
    /// Only allowed at the top of the script, before any other command
    pub leading: bool,
    /// Must directly follow one of these commands
    pub follows: &'static [&'static str],
    pub validate: Option<ValidateFn>,
    pub generate: Option<GenerateFn>,
}

impl CommandDef {
    /// Plain command without arguments, for struct update syntax
    pub const COMMAND: CommandDef = CommandDef {
        identifier: "",
        kind: CommandKind::Command,
        flow: Flow::Plain,
        arity: Arity::NONE,
        subtests: SubTests::None,
        block: BlockPolicy::Forbidden,
        leading: false,
        follows: &[],
        validate: None,
        generate: None,
    };

    /// Plain test without arguments, for struct update syntax
    pub const TEST: CommandDef = CommandDef {
        kind: CommandKind::Test,
        ..CommandDef::COMMAND
    };
}

impl fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDef")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("flow", &self.flow)
            .finish()
    }
}

#[derive(Clone, Copy)]
pub enum TagKind {
    /// Matches one identifier exactly (case-insensitive)
    Normal(&'static str),
    /// Matches whatever the predicate accepts
    Instanced(InstanceFn),
    /// Never written; validated once per command
    Persistent,
}

pub struct TagDef {
    pub kind: TagKind,
    /// The tag may appear more than once with the same code
    pub allow_multiple: bool,
    pub validate: Option<TagValidateFn>,
    /// Hook for persistent tags
    pub validate_persistent: Option<ValidateFn>,
}

impl TagDef {
    /// Normal tag without parameters
    pub const fn flag(identifier: &'static str) -> Self {
        Self {
            kind: TagKind::Normal(identifier),
            allow_multiple: false,
            validate: None,
            validate_persistent: None,
        }
    }

    /// Display name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self.kind {
            TagKind::Normal(id) => id,
            TagKind::Instanced(_) => "(instanced)",
            TagKind::Persistent => "(persistent)",
        }
    }
}

impl fmt::Debug for TagDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagDef")
            .field("name", &self.name())
            .field("allow_multiple", &self.allow_multiple)
            .finish()
    }
}

/// One tag occurrence being validated
#[derive(Debug)]
pub struct TagCall<'a> {
    /// Identifier as written, without the colon
    pub identifier: &'a str,
    pub line: u32,
    /// Command the tag is attached to
    pub command: &'static str,
    /// Data returned by the instance predicate
    pub instance: Option<usize>,
    /// Optional operand code; hooks may change it
    pub code: u8,
    /// Value emitted with the tag
    pub value: ArgValue,
    args: &'a [Argument],
    consumed: usize,
}

impl<'a> TagCall<'a> {
    pub(crate) fn new(
        identifier: &'a str,
        line: u32,
        command: &'static str,
        instance: Option<usize>,
        code: u8,
        args: &'a [Argument],
    ) -> Self {
        Self {
            identifier,
            line,
            command,
            instance,
            code,
            value: ArgValue::Omitted,
            args,
            consumed: 0,
        }
    }

    /// Consume the next argument if it is not a tag
    pub fn take_argument(&mut self) -> Option<&'a Argument> {
        let arg = self.args.get(self.consumed).filter(|a| !a.is_tag())?;
        self.consumed += 1;
        Some(arg)
    }

    /// Arguments consumed as tag parameters
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_ast::ArgumentValue;

    static TWO: [ArgSpec; 2] = [arg("header names", ArgKind::StringList), arg("keys", ArgKind::StringList)];
    static ONE: [ArgSpec; 1] = [arg("value patterns", ArgKind::StringList)];

    #[test]
    fn test_arity_spec_lookup() {
        let arity = Arity::trailing(&TWO, &ONE);
        assert_eq!(arity.spec(1).map(|s| s.name), Some("keys"));
        assert_eq!(arity.spec(2).map(|s| s.name), Some("value patterns"));
        assert!(arity.spec(3).is_none());
        assert!(Arity::NONE.spec(0).is_none());
    }

    #[test]
    fn test_take_argument_stops_at_tags() {
        let args = vec![
            Argument::new(ArgumentValue::String("i;octet".into()), 1),
            Argument::new(ArgumentValue::Tag("is".into()), 1),
        ];
        let mut call = TagCall::new("comparator", 1, "header", None, 1, &args);
        assert!(call.take_argument().is_some());
        assert!(call.take_argument().is_none());
        assert_eq!(call.consumed(), 1);
    }
}
