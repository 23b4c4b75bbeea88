//! Annotated tree produced by the validator
//!
//! Every node refers to its resolved [`CommandDef`], every argument has been
//! type-checked and bound, and tags carry the objects they select. The
//! generator consumes this tree and then drops it.

use super::diagnostics::Diagnostics;
use super::grammar::{CommandDef, Flow, TagDef};
use crate::extension::ExtId;
use crate::objects::{ObjRef, ObjectClass};
use crate::vm::ExtContexts;

/// Piece of a string that is assembled at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringPart {
    Literal(String),
    /// Extension operand, e.g. a variable reference
    Extension { ext: ExtId, code: u8, index: u32 },
}

/// A bound string argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringExpr {
    Literal(String),
    Catenated(Vec<StringPart>),
}

impl StringExpr {
    /// The string, when it is known at compile time
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            StringExpr::Literal(s) => Some(s),
            StringExpr::Catenated(_) => None,
        }
    }
}

/// Value of a bound argument, in the shape it is emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Omitted,
    Number(u64),
    String(StringExpr),
    StringList(Vec<StringExpr>),
    Object(ObjectClass, ObjRef),
    Extension { ext: ExtId, code: u8, index: u32 },
}

impl ArgValue {
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => s.as_literal(),
            _ => None,
        }
    }

    /// Literal members of a string list, skipping runtime strings
    pub fn literals(&self) -> Vec<&str> {
        match self {
            ArgValue::String(s) => s.as_literal().into_iter().collect(),
            ArgValue::StringList(list) => list.iter().filter_map(StringExpr::as_literal).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A tagged argument after validation
#[derive(Debug, Clone)]
pub struct BoundTag {
    pub def: &'static TagDef,
    pub ext: Option<ExtId>,
    /// Optional operand code; 0 when the tag is not emitted as an optional
    pub code: u8,
    pub identifier: String,
    pub value: ArgValue,
    pub line: u32,
}

/// A validated command or test
#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    pub def: &'static CommandDef,
    /// Extension providing the command, `None` for core commands
    pub ext: Option<ExtId>,
    pub line: u32,
    /// Positional arguments in declaration order
    pub operands: Vec<ArgValue>,
    pub tags: Vec<BoundTag>,
    pub tests: Vec<ValidatedCommand>,
    pub block: Option<Vec<ValidatedCommand>>,
}

impl ValidatedCommand {
    pub fn identifier(&self) -> &'static str {
        self.def.identifier
    }

    pub fn flow(&self) -> Flow {
        self.def.flow
    }

    /// First bound tag with this identifier
    pub fn tag(&self, identifier: &str) -> Option<&BoundTag> {
        self.tags
            .iter()
            .find(|t| t.identifier.eq_ignore_ascii_case(identifier))
    }

    pub fn has_tag(&self, identifier: &str) -> bool {
        self.tag(identifier).is_some()
    }

    /// Object selected by a tag of the given class, if any
    pub fn object(&self, class: ObjectClass) -> Option<ObjRef> {
        self.tags.iter().find_map(|t| match t.value {
            ArgValue::Object(c, obj) if c == class => Some(obj),
            _ => None,
        })
    }
}

/// Result of validating a script
#[derive(Debug)]
pub struct ValidatedScript {
    pub name: String,
    pub commands: Vec<ValidatedCommand>,
    /// Extensions in activation order
    pub activated: Vec<ExtId>,
    /// Compile-time extension state handed on to the generator
    pub contexts: ExtContexts,
    pub diagnostics: Diagnostics,
}
