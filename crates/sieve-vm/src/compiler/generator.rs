//! Code generation
//!
//! Walks the validated tree and emits the main program. Control structures
//! are lowered to forward jumps: every jump is emitted with a placeholder
//! offset whose address goes into a jump list, and the list is patched once
//! the target code exists.
//!
//! Tests are generated with a jump sense. `generate_test(test, true, ..)`
//! emits code that jumps when the test succeeds and falls through
//! otherwise; `false` does the opposite.

use super::grammar::Flow;
use super::tree::{ArgValue, StringExpr, StringPart, ValidatedCommand, ValidatedScript};
use crate::error::CompileError;
use crate::extension::{ExtId, ExtensionRegistry};
use crate::objects::ObjRef;
use crate::opcode::{
    OpCode, OperandLayout, OBJECT_EXTENSION, OPERAND_CATENATED, OPERAND_CUSTOM, OPERAND_NUMBER,
    OPERAND_OMITTED, OPERAND_STRING, OPERAND_STRING_LIST, OPT_END, OP_CUSTOM,
};
use crate::vm::ExtContexts;
use sieve_binary::{Binary, BinaryBuilder, CodeBuffer, ScriptMetadata};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Generate a binary from a validated script
pub fn generate(
    registry: &ExtensionRegistry,
    script: ValidatedScript,
    metadata: &ScriptMetadata,
) -> Result<Arc<Binary>, CompileError> {
    let ValidatedScript {
        name,
        commands,
        activated,
        contexts,
        ..
    } = script;

    let mut generator = Generator {
        registry,
        builder: BinaryBuilder::new(),
        links: HashMap::new(),
        contexts,
    };

    for ext in &activated {
        generator.link(*ext)?;
    }

    generator.generate_block(&commands)?;

    for ext in &activated {
        let finish = registry.get(*ext).and_then(|def| def.generator_finish);
        if let Some(finish) = finish {
            finish(&mut generator, *ext)?;
        }
    }

    generator.builder.set_metadata(metadata);
    let size = generator.builder.main_program().len();
    let binary = generator.builder.finish();
    tracing::debug!(
        script = %name,
        extensions = activated.len(),
        program_size = size,
        "generated binary"
    );
    Ok(binary)
}

pub struct Generator<'r> {
    registry: &'r ExtensionRegistry,
    builder: BinaryBuilder,
    /// Linkage table index of every linked extension
    links: HashMap<ExtId, u32>,
    contexts: ExtContexts,
}

impl<'r> Generator<'r> {
    pub fn registry(&self) -> &'r ExtensionRegistry {
        self.registry
    }

    /// Main program buffer
    pub fn code(&mut self) -> &mut CodeBuffer {
        self.builder.main_program()
    }

    /// Compile-time state left behind by the validator
    pub fn context<T: Any + Send>(&self, ext: ExtId) -> Option<&T> {
        self.contexts.get(ext)
    }

    // ===== Linkage =====

    fn link(&mut self, ext: ExtId) -> Result<u32, CompileError> {
        if let Some(index) = self.links.get(&ext) {
            return Ok(*index);
        }
        let def = self
            .registry
            .get(ext)
            .ok_or_else(|| CompileError::Generation(format!("extension {} is not registered", ext)))?;
        let index = self.builder.link_extension(def.name, def.version);
        self.links.insert(ext, index);
        Ok(index)
    }

    /// Linkage table index of an extension, linking it if needed
    pub fn link_index(&mut self, ext: ExtId) -> Result<u32, CompileError> {
        self.link(ext)
    }

    /// Create the block owned by an extension
    pub fn create_extension_block(&mut self, ext: ExtId) -> Result<u32, CompileError> {
        let index = self.link(ext)?;
        let block = self.builder.create_block(index);
        self.builder.set_extension_block(index, block);
        Ok(block)
    }

    pub fn block_mut(&mut self, id: u32) -> Option<&mut CodeBuffer> {
        self.builder.block_mut(id)
    }

    // ===== Operations =====

    pub fn emit_core(&mut self, op: OpCode) -> usize {
        self.code().emit_byte(op.as_u8())
    }

    /// Emit the code bytes of an extension operation
    pub fn emit_extension_operation(&mut self, ext: ExtId, code: u8) -> Result<usize, CompileError> {
        let index = self.link(ext)?;
        let byte = u8::try_from(index)
            .ok()
            .and_then(|i| OP_CUSTOM.checked_add(i))
            .ok_or_else(|| {
                CompileError::Generation(format!("too many extensions linked ({})", index + 1))
            })?;
        let address = self.code().emit_byte(byte);
        self.code().emit_byte(code);
        Ok(address)
    }

    /// Emit a core operation with the command's operands and optionals
    pub fn emit_core_command(&mut self, op: OpCode, cmd: &ValidatedCommand) -> Result<(), CompileError> {
        self.emit_core(op);
        self.emit_arguments(op.layout(), cmd)
    }

    /// Emit an extension operation with the command's operands and optionals
    pub fn emit_extension_command(
        &mut self,
        ext: ExtId,
        code: u8,
        cmd: &ValidatedCommand,
    ) -> Result<(), CompileError> {
        let layout = self
            .registry
            .get(ext)
            .and_then(|def| def.operation(code))
            .map(|op| op.layout)
            .ok_or_else(|| {
                CompileError::Generation(format!(
                    "extension {} has no operation with code {}",
                    ext, code
                ))
            })?;
        self.emit_extension_operation(ext, code)?;
        self.emit_arguments(layout, cmd)
    }

    fn emit_arguments(&mut self, layout: OperandLayout, cmd: &ValidatedCommand) -> Result<(), CompileError> {
        if cmd.operands.len() > layout.operands {
            return Err(CompileError::Generation(format!(
                "'{}' has {} operands but its operation takes {}",
                cmd.identifier(),
                cmd.operands.len(),
                layout.operands
            )));
        }
        for operand in &cmd.operands {
            self.emit_operand(operand)?;
        }
        for _ in cmd.operands.len()..layout.operands {
            self.code().emit_byte(OPERAND_OMITTED);
        }
        if layout.optionals {
            self.emit_optionals(cmd)?;
        }
        Ok(())
    }

    /// Emit the optional block: marker, `code operand` pairs, terminator
    pub fn emit_optionals(&mut self, cmd: &ValidatedCommand) -> Result<(), CompileError> {
        self.code().emit_byte(OPT_END);
        for tag in cmd.tags.iter().filter(|t| t.code != OPT_END) {
            self.code().emit_byte(tag.code);
            self.emit_operand(&tag.value)?;
        }
        self.code().emit_byte(OPT_END);
        Ok(())
    }

    // ===== Operands =====

    pub fn emit_operand(&mut self, value: &ArgValue) -> Result<(), CompileError> {
        match value {
            ArgValue::Omitted => {
                self.code().emit_byte(OPERAND_OMITTED);
            }
            ArgValue::Number(n) => {
                self.code().emit_byte(OPERAND_NUMBER);
                self.code().emit_integer(*n);
            }
            ArgValue::String(expr) => self.emit_string_expr(expr)?,
            ArgValue::StringList(list) => {
                self.code().emit_byte(OPERAND_STRING_LIST);
                self.code().emit_integer(list.len() as u64);
                for expr in list {
                    self.emit_string_expr(expr)?;
                }
            }
            ArgValue::Object(class, obj) => {
                self.code().emit_byte(class.operand_class());
                self.emit_object_ref(*obj)?;
            }
            ArgValue::Extension { ext, code, index } => {
                self.emit_custom_operand(*ext, *code, *index)?;
            }
        }
        Ok(())
    }

    pub fn emit_string_expr(&mut self, expr: &StringExpr) -> Result<(), CompileError> {
        match expr {
            StringExpr::Literal(s) => {
                self.code().emit_byte(OPERAND_STRING);
                self.code().emit_string(s);
            }
            StringExpr::Catenated(parts) => {
                self.code().emit_byte(OPERAND_CATENATED);
                self.code().emit_integer(parts.len() as u64);
                for part in parts {
                    match part {
                        StringPart::Literal(s) => {
                            self.code().emit_byte(OPERAND_STRING);
                            self.code().emit_string(s);
                        }
                        StringPart::Extension { ext, code, index } => {
                            self.emit_custom_operand(*ext, *code, *index)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_custom_operand(&mut self, ext: ExtId, code: u8, index: u32) -> Result<(), CompileError> {
        let link = self.link(ext)?;
        let code_buf = self.code();
        code_buf.emit_byte(OPERAND_CUSTOM);
        code_buf.emit_integer(u64::from(link));
        code_buf.emit_byte(code);
        code_buf.emit_integer(u64::from(index));
        Ok(())
    }

    /// Core objects are a single code byte; extension objects are prefixed
    /// with [`OBJECT_EXTENSION`] and the linkage index
    pub fn emit_object_ref(&mut self, obj: ObjRef) -> Result<(), CompileError> {
        match obj.ext {
            None => {
                self.code().emit_byte(obj.code);
            }
            Some(ext) => {
                let link = self.link(ext)?;
                let code_buf = self.code();
                code_buf.emit_byte(OBJECT_EXTENSION);
                code_buf.emit_integer(u64::from(link));
                code_buf.emit_byte(obj.code);
            }
        }
        Ok(())
    }

    // ===== Jumps =====

    /// Emit a jump with a placeholder offset, returning the offset address
    pub fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_core(op);
        self.code().emit_offset(0)
    }

    /// Point every jump in `jumps` at the current address
    pub fn resolve_jumps(&mut self, jumps: &[usize]) -> Result<(), CompileError> {
        let target = self.code().address();
        for &address in jumps {
            if !self.code().resolve_offset(address, target) {
                return Err(CompileError::Generation(format!(
                    "cannot resolve jump at {} to {}",
                    address, target
                )));
            }
        }
        Ok(())
    }

    // ===== Tree walking =====

    fn generate_block(&mut self, commands: &[ValidatedCommand]) -> Result<(), CompileError> {
        let mut exits: Vec<usize> = Vec::new();

        for (i, cmd) in commands.iter().enumerate() {
            match cmd.flow() {
                Flow::Require => {}
                Flow::If | Flow::Elsif => {
                    let test = cmd.tests.first().ok_or_else(|| {
                        CompileError::Generation(format!("'{}' without a test", cmd.identifier()))
                    })?;
                    let mut false_jumps = Vec::new();
                    self.generate_test(test, false, &mut false_jumps)?;
                    if let Some(block) = &cmd.block {
                        self.generate_block(block)?;
                    }

                    let chained = commands
                        .get(i + 1)
                        .is_some_and(|next| matches!(next.flow(), Flow::Elsif | Flow::Else));
                    if chained {
                        exits.push(self.emit_jump(OpCode::Jmp));
                    }
                    self.resolve_jumps(&false_jumps)?;
                    if !chained {
                        self.resolve_jumps(&exits)?;
                        exits.clear();
                    }
                }
                Flow::Else => {
                    if let Some(block) = &cmd.block {
                        self.generate_block(block)?;
                    }
                    self.resolve_jumps(&exits)?;
                    exits.clear();
                }
                Flow::Plain => self.generate_plain(cmd)?,
                _ => {
                    return Err(CompileError::Generation(format!(
                        "test '{}' used as a command",
                        cmd.identifier()
                    )))
                }
            }
        }
        Ok(())
    }

    fn generate_plain(&mut self, cmd: &ValidatedCommand) -> Result<(), CompileError> {
        match cmd.def.generate {
            Some(hook) => hook(self, cmd),
            None => Err(CompileError::Generation(format!(
                "'{}' has no code generator",
                cmd.identifier()
            ))),
        }
    }

    /// Emit `test` so that control jumps when its result equals `jump_if`
    fn generate_test(
        &mut self,
        test: &ValidatedCommand,
        jump_if: bool,
        jumps: &mut Vec<usize>,
    ) -> Result<(), CompileError> {
        match test.flow() {
            Flow::True => {
                if jump_if {
                    jumps.push(self.emit_jump(OpCode::Jmp));
                }
            }
            Flow::False => {
                if !jump_if {
                    jumps.push(self.emit_jump(OpCode::Jmp));
                }
            }
            Flow::Not => {
                if let Some(inner) = test.tests.first() {
                    self.generate_test(inner, !jump_if, jumps)?;
                }
            }
            Flow::AllOf => self.generate_chain(&test.tests, false, jump_if, jumps)?,
            Flow::AnyOf => self.generate_chain(&test.tests, true, jump_if, jumps)?,
            Flow::Plain => {
                self.generate_plain(test)?;
                let op = if jump_if { OpCode::JmpTrue } else { OpCode::JmpFalse };
                jumps.push(self.emit_jump(op));
            }
            _ => {
                return Err(CompileError::Generation(format!(
                    "command '{}' used as a test",
                    test.identifier()
                )))
            }
        }
        Ok(())
    }

    /// `anyof` (`decisive` true) or `allof` (`decisive` false)
    ///
    /// A sub-test result equal to `decisive` settles the whole list.
    fn generate_chain(
        &mut self,
        tests: &[ValidatedCommand],
        decisive: bool,
        jump_if: bool,
        jumps: &mut Vec<usize>,
    ) -> Result<(), CompileError> {
        if jump_if == decisive {
            for test in tests {
                self.generate_test(test, jump_if, jumps)?;
            }
            return Ok(());
        }

        let Some((last, rest)) = tests.split_last() else {
            return Ok(());
        };
        let mut settled = Vec::new();
        for test in rest {
            self.generate_test(test, decisive, &mut settled)?;
        }
        self.generate_test(last, jump_if, jumps)?;
        self.resolve_jumps(&settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::validator::Validator;
    use crate::settings::Settings;
    use chrono::{TimeZone, Utc};
    use sieve_ast::{command, test, Script};

    fn build(script: &Script) -> Arc<Binary> {
        let registry = ExtensionRegistry::new();
        let settings = Settings::default();
        let validated = Validator::new(&registry, &settings, false)
            .validate(script)
            .unwrap();
        let metadata = ScriptMetadata::new(&script.name, 0, Utc.timestamp_opt(0, 0).unwrap());
        generate(&registry, validated, &metadata).unwrap()
    }

    #[test]
    fn test_generation_is_deterministic() {
        let script = Script::new("det").commands(vec![
            command("if")
                .test(test("anyof").tests(vec![
                    test("header").tag("contains").string("subject").string("spam"),
                    test("size").tag("over").number(100_000),
                ]))
                .block(vec![command("discard").build(), command("stop").build()])
                .build(),
            command("keep").build(),
        ]);
        let a = build(&script).main_program().unwrap();
        let b = build(&script).main_program().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_script_links_implicit_extensions() {
        let binary = build(&Script::new("empty"));
        assert!(binary.main_program().unwrap().is_empty());
        let names: Vec<&str> = binary.extensions().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["comparator-i;octet", "comparator-i;ascii-casemap"]);
    }

    #[test]
    fn test_true_emits_no_jump() {
        let script = Script::new("t").command(
            command("if")
                .test(test("true"))
                .block(vec![command("keep").build()])
                .build(),
        );
        let program = build(&script).main_program().unwrap();
        assert_eq!(&program[..], &[OpCode::Keep.as_u8()]);
    }

    #[test]
    fn test_false_jumps_over_block() {
        let script = Script::new("f").command(
            command("if")
                .test(test("false"))
                .block(vec![command("keep").build()])
                .build(),
        );
        let program = build(&script).main_program().unwrap();
        // offset is relative to its own address (1), target is the end (6)
        assert_eq!(
            &program[..],
            &[OpCode::Jmp.as_u8(), 0, 0, 0, 5, OpCode::Keep.as_u8()]
        );
    }

    #[test]
    fn test_optional_block_always_present() {
        let script = Script::new("r").command(command("redirect").string("a@example.com").build());
        let program = build(&script).main_program().unwrap();
        let mut expected = vec![OpCode::Redirect.as_u8(), OPERAND_STRING, 13];
        expected.extend_from_slice(b"a@example.com");
        expected.extend_from_slice(&[OPT_END, OPT_END]);
        assert_eq!(&program[..], &expected[..]);
    }
}
