//! Script validation
//!
//! The validator walks the syntax tree once. For every node it resolves
//! the definition, binds tagged arguments first and positional arguments
//! second, validates sub-tests and the block, and finally runs the
//! definition's own check. Diagnostics accumulate; validation only stops
//! early for internal errors, fatal errors or when the error cap is hit.
//!
//! Extensions are activated by `require`. Implicit extensions are loaded
//! when the first command other than `require` is seen, after which every
//! pair of active extensions is checked for conflicts.

use super::diagnostics::Diagnostics;
use super::grammar::{
    ArgKind, ArgSpec, BlockPolicy, CommandDef, CommandKind, SubTests, TagCall, TagDef, TagKind,
};
use super::tree::{ArgValue, BoundTag, StringExpr, ValidatedCommand, ValidatedScript};
use crate::error::CompileError;
use crate::extension::{ExtId, ExtensionRegistry};
use crate::objects::{AddressPart, Comparator};
use crate::settings::Settings;
use crate::vm::ExtContexts;
use sieve_ast::{Argument, ArgumentValue, Command, Script, Test, Tests};
use std::any::Any;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct TagReg {
    def: &'static TagDef,
    ext: Option<ExtId>,
    code: u8,
}

/// Registration of one command identifier
///
/// Tags may be registered before the command itself (e.g. `:copy` for
/// `fileinto`); the entry then stays a placeholder until the command is.
#[derive(Debug, Default)]
struct CommandReg {
    def: Option<(&'static CommandDef, Option<ExtId>)>,
    tags: Vec<TagReg>,
}

/// Resolves the final object code of a match type, consuming tag
/// parameters such as the relation of `:value`
pub type ResolveFn = fn(&mut Validator<'_>, &mut TagCall<'_>) -> Option<u8>;

#[derive(Clone, Copy)]
pub struct MatchTypeReg {
    pub identifier: &'static str,
    pub ext: Option<ExtId>,
    pub code: u8,
    pub resolve: Option<ResolveFn>,
}

#[derive(Clone, Copy)]
pub struct ComparatorReg {
    pub ext: Option<ExtId>,
    pub comparator: &'static dyn Comparator,
}

#[derive(Clone, Copy)]
pub struct AddressPartReg {
    pub ext: Option<ExtId>,
    pub part: &'static dyn AddressPart,
}

/// Binds one string argument; `None` means an error was reported
pub type BindFn = fn(&mut Validator<'_>, &str, u32) -> Option<StringExpr>;

#[derive(Clone, Copy)]
struct StringHandler {
    ext: ExtId,
    bind: BindFn,
}

/// Syntax node viewed uniformly for commands and tests
struct Node<'a> {
    identifier: &'a str,
    arguments: &'a [Argument],
    tests: &'a Tests,
    block: Option<&'a [Command]>,
    line: u32,
}

impl<'a> From<&'a Command> for Node<'a> {
    fn from(cmd: &'a Command) -> Self {
        Self {
            identifier: &cmd.identifier,
            arguments: &cmd.arguments,
            tests: &cmd.tests,
            block: cmd.block.as_deref(),
            line: cmd.line,
        }
    }
}

impl<'a> From<&'a Test> for Node<'a> {
    fn from(test: &'a Test) -> Self {
        Self {
            identifier: &test.identifier,
            arguments: &test.arguments,
            tests: &test.tests,
            block: None,
            line: test.line,
        }
    }
}

pub struct Validator<'r> {
    registry: &'r ExtensionRegistry,
    settings: &'r Settings,
    global_script: bool,
    diagnostics: Diagnostics,
    commands: HashMap<String, CommandReg>,
    activated: Vec<ExtId>,
    comparators: Vec<ComparatorReg>,
    match_types: Vec<MatchTypeReg>,
    address_parts: Vec<AddressPartReg>,
    string_handlers: Vec<StringHandler>,
    /// Handlers visible to the handler currently running
    handler_level: usize,
    contexts: ExtContexts,
    /// A top-level command other than `require` was validated
    seen_command: bool,
    implicit_loaded: bool,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r ExtensionRegistry, settings: &'r Settings, global_script: bool) -> Self {
        let mut validator = Self {
            registry,
            settings,
            global_script,
            diagnostics: Diagnostics::new(settings.max_errors),
            commands: HashMap::new(),
            activated: Vec::new(),
            comparators: Vec::new(),
            match_types: Vec::new(),
            address_parts: Vec::new(),
            string_handlers: Vec::new(),
            handler_level: 0,
            contexts: ExtContexts::default(),
            seen_command: false,
            implicit_loaded: false,
        };
        crate::commands::register_core(&mut validator);
        validator
    }

    pub fn registry(&self) -> &'r ExtensionRegistry {
        self.registry
    }

    pub fn settings(&self) -> &'r Settings {
        self.settings
    }

    pub fn global_script(&self) -> bool {
        self.global_script
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn error(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.error(line, message);
    }

    pub fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.warning(line, message);
    }

    // ===== Registration =====

    pub fn register_command(&mut self, ext: Option<ExtId>, def: &'static CommandDef) {
        let entry = self.commands.entry(def.identifier.to_string()).or_default();
        entry.def = Some((def, ext));
    }

    /// Register a tag for `command`, emitted with optional operand `code`
    pub fn register_tag(&mut self, command: &str, ext: Option<ExtId>, def: &'static TagDef, code: u8) {
        let entry = self.commands.entry(command.to_ascii_lowercase()).or_default();
        entry.tags.push(TagReg { def, ext, code });
    }

    pub fn register_comparator(&mut self, ext: Option<ExtId>, comparator: &'static dyn Comparator) {
        self.comparators.push(ComparatorReg { ext, comparator });
    }

    pub fn register_match_type(&mut self, reg: MatchTypeReg) {
        self.match_types.push(reg);
    }

    pub fn register_address_part(&mut self, ext: Option<ExtId>, part: &'static dyn AddressPart) {
        self.address_parts.push(AddressPartReg { ext, part });
    }

    /// Install a string handler on top of the current one
    pub fn register_string_handler(&mut self, ext: ExtId, bind: BindFn) {
        self.string_handlers.push(StringHandler { ext, bind });
    }

    // ===== Object lookup =====

    pub fn comparator(&self, identifier: &str) -> Option<ComparatorReg> {
        self.comparators
            .iter()
            .find(|c| c.comparator.identifier().eq_ignore_ascii_case(identifier))
            .copied()
    }

    pub fn match_type_index(&self, identifier: &str) -> Option<usize> {
        self.match_types
            .iter()
            .position(|m| m.identifier.eq_ignore_ascii_case(identifier))
    }

    pub fn match_type(&self, index: usize) -> Option<MatchTypeReg> {
        self.match_types.get(index).copied()
    }

    pub fn address_part_index(&self, identifier: &str) -> Option<usize> {
        self.address_parts
            .iter()
            .position(|a| a.part.identifier().eq_ignore_ascii_case(identifier))
    }

    pub fn address_part(&self, index: usize) -> Option<AddressPartReg> {
        self.address_parts.get(index).copied()
    }

    // ===== Extensions =====

    /// Activate an extension, running its validator hook once
    pub fn load_extension(&mut self, ext: ExtId) -> bool {
        if self.activated.contains(&ext) {
            return true;
        }
        let Some(def) = self.registry.get(ext) else {
            self.diagnostics
                .internal(format!("extension {} is not registered", ext));
            return false;
        };
        self.activated.push(ext);
        tracing::trace!(extension = def.name, "activating extension");
        if !(def.validator_load)(self, ext) {
            self.diagnostics
                .internal(format!("failed to load extension '{}'", def.name));
            return false;
        }
        true
    }

    /// Handle one capability named by `require`
    pub fn require_extension(&mut self, name: &str, line: u32) -> bool {
        let name = name.to_ascii_lowercase();
        let ext = self
            .registry
            .lookup(&name)
            .filter(|_| self.settings.extension_enabled(&name));
        let Some(ext) = ext else {
            self.error(line, format!("require: unknown Sieve capability '{}'", name));
            return false;
        };
        if self.settings.extension_global(&name) && !self.global_script {
            self.error(
                line,
                format!(
                    "require: Sieve capability '{}' is restricted to global scripts",
                    name
                ),
            );
            return false;
        }
        self.load_extension(ext)
    }

    pub fn is_active(&self, ext: ExtId) -> bool {
        self.activated.contains(&ext)
    }

    /// Whether the named extension was activated by this script
    pub fn is_active_name(&self, name: &str) -> bool {
        self.registry
            .lookup(name)
            .is_some_and(|ext| self.is_active(ext))
    }

    fn activate_implicit(&mut self) {
        self.implicit_loaded = true;
        let implicit: Vec<ExtId> = self.registry.implicit().collect();
        for ext in implicit {
            if !self.load_extension(ext) {
                return;
            }
        }
        self.check_conflicts();
    }

    fn check_conflicts(&mut self) {
        let defs: Vec<_> = self
            .activated
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .collect();
        for (i, a) in defs.iter().enumerate() {
            for (j, b) in defs.iter().enumerate() {
                if i != j && (a.conflicts)(a, b) {
                    self.diagnostics.fatal(
                        None,
                        format!("extension '{}' conflicts with extension '{}'", a.name, b.name),
                    );
                    return;
                }
            }
        }
    }

    /// Compile-time state of an extension, created on first use
    pub fn context_mut<T: Any + Send + Default>(&mut self, ext: ExtId) -> &mut T {
        self.contexts.get_or_default(ext)
    }

    pub fn context<T: Any + Send>(&self, ext: ExtId) -> Option<&T> {
        self.contexts.get(ext)
    }

    // ===== String binding =====

    /// Bind a string argument through the active string handler
    pub fn bind_string(&mut self, value: &str, line: u32) -> Option<StringExpr> {
        self.bind_at(self.string_handlers.len(), value, line)
    }

    /// Bind through the handler below the one currently running
    pub fn bind_string_super(&mut self, value: &str, line: u32) -> Option<StringExpr> {
        self.bind_at(self.handler_level, value, line)
    }

    fn bind_at(&mut self, level: usize, value: &str, line: u32) -> Option<StringExpr> {
        let Some(handler) = level.checked_sub(1).and_then(|i| self.string_handlers.get(i)).copied()
        else {
            return Some(StringExpr::Literal(value.to_string()));
        };
        let saved = std::mem::replace(&mut self.handler_level, level - 1);
        tracing::trace!(extension = %handler.ext, "binding string argument");
        let bound = (handler.bind)(self, value, line);
        self.handler_level = saved;
        bound
    }

    // ===== Tag parameters =====

    /// Consume a string parameter of a tag
    pub fn tag_string_argument(&mut self, call: &mut TagCall<'_>, what: &str) -> Option<String> {
        match call.take_argument().map(|a| &a.value) {
            Some(ArgumentValue::String(s)) => Some(s.clone()),
            found => {
                let found = found.map_or("nothing", |v| v.type_name());
                self.error(
                    call.line,
                    format!(
                        "the :{} tag of '{}' expects a string argument ({}), but {} was found",
                        call.identifier, call.command, what, found
                    ),
                );
                None
            }
        }
    }

    /// Consume a number parameter of a tag
    pub fn tag_number_argument(&mut self, call: &mut TagCall<'_>, what: &str) -> Option<u64> {
        match call.take_argument().map(|a| &a.value) {
            Some(ArgumentValue::Number(n)) => Some(*n),
            found => {
                let found = found.map_or("nothing", |v| v.type_name());
                self.error(
                    call.line,
                    format!(
                        "the :{} tag of '{}' expects a number argument ({}), but {} was found",
                        call.identifier, call.command, what, found
                    ),
                );
                None
            }
        }
    }

    // ===== Validation =====

    pub fn validate(mut self, script: &Script) -> Result<ValidatedScript, CompileError> {
        tracing::debug!(script = %script.name, commands = script.commands.len(), "validating script");

        let commands = self.validate_block(&script.commands, true);
        if !self.implicit_loaded && !self.diagnostics.aborted() {
            self.activate_implicit();
        }

        if self.diagnostics.has_errors() {
            tracing::debug!(
                script = %script.name,
                errors = self.diagnostics.error_count(),
                "validation failed"
            );
            return Err(CompileError::Validation(self.diagnostics));
        }

        Ok(ValidatedScript {
            name: script.name.clone(),
            commands,
            activated: self.activated,
            contexts: self.contexts,
            diagnostics: self.diagnostics,
        })
    }

    fn is_leading(&self, identifier: &str) -> bool {
        self.commands
            .get(&identifier.to_ascii_lowercase())
            .and_then(|reg| reg.def)
            .is_some_and(|(def, _)| def.leading)
    }

    fn validate_block(&mut self, commands: &[Command], top: bool) -> Vec<ValidatedCommand> {
        let mut out = Vec::with_capacity(commands.len());
        let mut previous: Option<String> = None;

        for cmd in commands {
            if self.diagnostics.aborted() {
                break;
            }
            if top && !self.implicit_loaded && !self.is_leading(&cmd.identifier) {
                self.activate_implicit();
                if self.diagnostics.aborted() {
                    break;
                }
            }

            let node = Node::from(cmd);
            if let Some(validated) =
                self.validate_node(&node, CommandKind::Command, top, previous.as_deref())
            {
                out.push(validated);
            }
            previous = Some(cmd.identifier.to_ascii_lowercase());
        }
        out
    }

    fn validate_node(
        &mut self,
        node: &Node<'_>,
        expect: CommandKind,
        top: bool,
        previous: Option<&str>,
    ) -> Option<ValidatedCommand> {
        let identifier = node.identifier.to_ascii_lowercase();
        let (def, ext, tag_regs) = match self.commands.get(&identifier) {
            Some(CommandReg {
                def: Some((def, ext)),
                tags,
            }) => (*def, *ext, tags.clone()),
            _ => {
                self.error(node.line, format!("unknown {} '{}'", expect.name(), node.identifier));
                return None;
            }
        };

        if def.kind != expect {
            self.error(
                node.line,
                format!(
                    "'{}' is a {} and cannot be used as a {}",
                    def.identifier,
                    def.kind.name(),
                    expect.name()
                ),
            );
            return None;
        }

        let mut ok = true;

        if expect == CommandKind::Command {
            if def.leading {
                if !top || self.seen_command {
                    self.error(
                        node.line,
                        format!(
                            "the '{}' command can only be used at the beginning of the script",
                            def.identifier
                        ),
                    );
                    ok = false;
                }
            } else if top {
                self.seen_command = true;
            }

            if !def.follows.is_empty() && !previous.is_some_and(|p| def.follows.iter().any(|f| *f == p)) {
                let allowed: Vec<String> = def.follows.iter().map(|f| format!("'{}'", f)).collect();
                self.error(
                    node.line,
                    format!(
                        "the '{}' command must follow an {} command",
                        def.identifier,
                        allowed.join(" or ")
                    ),
                );
                ok = false;
            }
        }

        // ===== Tagged arguments =====

        let mut tags: Vec<BoundTag> = Vec::new();
        let mut positional: Vec<&Argument> = Vec::new();
        let mut pos = 0;

        while pos < node.arguments.len() {
            let arg = &node.arguments[pos];
            pos += 1;
            let Some(tag_id) = arg.as_tag() else {
                positional.push(arg);
                continue;
            };

            if !positional.is_empty() {
                self.error(
                    arg.line,
                    format!(
                        "the :{} tag must come before the positional arguments of '{}'",
                        tag_id, def.identifier
                    ),
                );
                ok = false;
                continue;
            }

            let Some((reg, instance)) = self.find_tag(&tag_regs, tag_id) else {
                self.error(
                    arg.line,
                    format!(
                        "unknown tagged argument ':{}' for the '{}' {}",
                        tag_id,
                        def.identifier,
                        def.kind.name()
                    ),
                );
                ok = false;
                continue;
            };

            let mut call = TagCall::new(
                tag_id,
                arg.line,
                def.identifier,
                instance,
                reg.code,
                &node.arguments[pos..],
            );
            let valid = match reg.def.validate {
                Some(hook) => hook(self, &mut call),
                None => true,
            };
            pos += call.consumed();
            if !valid {
                ok = false;
                continue;
            }

            let duplicate = !reg.def.allow_multiple
                && tags
                    .iter()
                    .rev()
                    .any(|t| std::ptr::eq(t.def, reg.def) && t.code == call.code);
            if duplicate {
                self.error(
                    arg.line,
                    format!(
                        "the :{} tag conflicts with an earlier tag of '{}'",
                        tag_id, def.identifier
                    ),
                );
                ok = false;
                continue;
            }

            tags.push(BoundTag {
                def: reg.def,
                ext: reg.ext,
                code: call.code,
                identifier: tag_id.to_ascii_lowercase(),
                value: call.value,
                line: arg.line,
            });
        }

        // ===== Positional arguments =====

        let mut operands = Vec::with_capacity(positional.len());
        let arity = def.arity;
        let min = arity.required.len();
        let max = min + arity.optional.len();

        if positional.len() < min || positional.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            self.error(
                node.line,
                format!(
                    "the '{}' {} expects {} positional argument(s), but {} were found",
                    def.identifier,
                    def.kind.name(),
                    expected,
                    positional.len()
                ),
            );
            ok = false;
        } else {
            for (index, arg) in positional.iter().enumerate() {
                let Some(spec) = arity.spec(index) else {
                    break;
                };
                match self.bind_argument(def, index, spec, arg) {
                    Some(value) => operands.push(value),
                    None => ok = false,
                }
            }
        }

        // ===== Sub-tests =====

        let mut tests = Vec::new();
        match (def.subtests, node.tests) {
            (SubTests::None, Tests::None) => {}
            (SubTests::None, _) => {
                self.error(
                    node.line,
                    format!("the '{}' {} does not accept any tests", def.identifier, def.kind.name()),
                );
                ok = false;
            }
            (SubTests::Single, Tests::Single(test)) => {
                match self.validate_node(&Node::from(&**test), CommandKind::Test, false, None) {
                    Some(t) => tests.push(t),
                    None => ok = false,
                }
            }
            (SubTests::Single, _) => {
                self.error(
                    node.line,
                    format!("the '{}' {} expects exactly one test", def.identifier, def.kind.name()),
                );
                ok = false;
            }
            (SubTests::List, Tests::List(list)) if list.is_empty() => {
                self.error(
                    node.line,
                    format!("the test list of '{}' must not be empty", def.identifier),
                );
                ok = false;
            }
            (SubTests::List, Tests::List(list)) => {
                for test in list {
                    match self.validate_node(&Node::from(test), CommandKind::Test, false, None) {
                        Some(t) => tests.push(t),
                        None => ok = false,
                    }
                }
            }
            (SubTests::List, _) => {
                self.error(
                    node.line,
                    format!("the '{}' {} expects a test list", def.identifier, def.kind.name()),
                );
                ok = false;
            }
        }

        // ===== Block =====

        let block = match (def.block, node.block) {
            (BlockPolicy::Forbidden, Some(_)) => {
                self.error(
                    node.line,
                    format!("the '{}' command does not accept a block", def.identifier),
                );
                ok = false;
                None
            }
            (BlockPolicy::Required, None) => {
                self.error(node.line, format!("the '{}' command requires a block", def.identifier));
                ok = false;
                None
            }
            (_, Some(commands)) => Some(self.validate_block(commands, false)),
            (_, None) => None,
        };

        if !ok {
            return None;
        }

        let mut validated = ValidatedCommand {
            def,
            ext,
            line: node.line,
            operands,
            tags,
            tests,
            block,
        };

        for reg in &tag_regs {
            if let (TagKind::Persistent, Some(hook)) = (reg.def.kind, reg.def.validate_persistent) {
                ok &= hook(self, &mut validated);
            }
        }
        if ok {
            if let Some(hook) = def.validate {
                ok = hook(self, &mut validated);
            }
        }

        ok.then_some(validated)
    }

    fn find_tag(&self, regs: &[TagReg], identifier: &str) -> Option<(TagReg, Option<usize>)> {
        let normal = regs.iter().find(|r| {
            matches!(r.def.kind, TagKind::Normal(id) if id.eq_ignore_ascii_case(identifier))
        });
        if let Some(reg) = normal {
            return Some((*reg, None));
        }
        regs.iter().find_map(|r| match r.def.kind {
            TagKind::Instanced(predicate) => predicate(self, identifier).map(|data| (*r, Some(data))),
            _ => None,
        })
    }

    fn bind_argument(
        &mut self,
        def: &CommandDef,
        index: usize,
        spec: &ArgSpec,
        arg: &Argument,
    ) -> Option<ArgValue> {
        match (spec.kind, &arg.value) {
            (ArgKind::Number, ArgumentValue::Number(n)) => Some(ArgValue::Number(*n)),
            (ArgKind::String, ArgumentValue::String(s)) => {
                self.bind_string(s, arg.line).map(ArgValue::String)
            }
            (ArgKind::StringList, ArgumentValue::String(s)) => self
                .bind_string(s, arg.line)
                .map(|expr| ArgValue::StringList(vec![expr])),
            (ArgKind::StringList, ArgumentValue::StringList(list)) => {
                let mut bound = Vec::with_capacity(list.len());
                let mut ok = true;
                for s in list {
                    match self.bind_string(s, arg.line) {
                        Some(expr) => bound.push(expr),
                        None => ok = false,
                    }
                }
                ok.then_some(ArgValue::StringList(bound))
            }
            (ArgKind::Literal, ArgumentValue::String(s)) => {
                Some(ArgValue::String(StringExpr::Literal(s.clone())))
            }
            (ArgKind::LiteralList, ArgumentValue::String(s)) => {
                Some(ArgValue::StringList(vec![StringExpr::Literal(s.clone())]))
            }
            (ArgKind::LiteralList, ArgumentValue::StringList(list)) => Some(ArgValue::StringList(
                list.iter().cloned().map(StringExpr::Literal).collect(),
            )),
            (kind, found) => {
                self.error(
                    arg.line,
                    format!(
                        "the '{}' {} expects a {} as argument {} ({}), but a {} was found",
                        def.identifier,
                        def.kind.name(),
                        kind.name(),
                        index + 1,
                        spec.name,
                        found.type_name()
                    ),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tree::StringPart;

    fn upper_handler(v: &mut Validator<'_>, value: &str, line: u32) -> Option<StringExpr> {
        if let Some(rest) = value.strip_prefix("up:") {
            return Some(StringExpr::Catenated(vec![StringPart::Literal(rest.to_uppercase())]));
        }
        v.bind_string_super(value, line)
    }

    fn wrap_handler(v: &mut Validator<'_>, value: &str, line: u32) -> Option<StringExpr> {
        if let Some(rest) = value.strip_prefix("wrap:") {
            return Some(StringExpr::Catenated(vec![StringPart::Literal(format!("[{}]", rest))]));
        }
        v.bind_string_super(value, line)
    }

    #[test]
    fn test_string_handlers_delegate_to_super() {
        let registry = ExtensionRegistry::new();
        let settings = Settings::default();
        let mut v = Validator::new(&registry, &settings, false);

        assert_eq!(v.bind_string("plain", 1), Some(StringExpr::Literal("plain".into())));

        v.register_string_handler(ExtId(0), upper_handler);
        v.register_string_handler(ExtId(1), wrap_handler);

        assert_eq!(
            v.bind_string("up:abc", 1),
            Some(StringExpr::Catenated(vec![StringPart::Literal("ABC".into())]))
        );
        assert_eq!(
            v.bind_string("wrap:abc", 1),
            Some(StringExpr::Catenated(vec![StringPart::Literal("[abc]".into())]))
        );
        assert_eq!(v.bind_string("other", 1), Some(StringExpr::Literal("other".into())));
        assert_eq!(v.handler_level, 0);
    }

    #[test]
    fn test_core_objects_registered() {
        let registry = ExtensionRegistry::new();
        let settings = Settings::default();
        let v = Validator::new(&registry, &settings, false);

        assert!(v.match_type_index("CONTAINS").is_some());
        assert!(v.address_part_index("domain").is_some());
        assert!(v.address_part_index("user").is_none());
    }

    #[test]
    fn test_require_restrictions() {
        let registry = ExtensionRegistry::new();
        let settings = Settings {
            extensions: Some(vec!["fileinto".into(), "editheader".into()]),
            global_extensions: vec!["editheader".into()],
            ..Settings::default()
        };

        let mut v = Validator::new(&registry, &settings, false);
        assert!(v.require_extension("FileInto", 1));
        assert!(v.is_active_name("fileinto"));
        assert!(!v.require_extension("regex", 2));
        assert!(!v.require_extension("editheader", 3));
        assert!(v.diagnostics().mentions("unknown Sieve capability 'regex'"));
        assert!(v.diagnostics().mentions("restricted to global scripts"));

        let mut global = Validator::new(&registry, &settings, true);
        assert!(global.require_extension("editheader", 1));
    }
}
