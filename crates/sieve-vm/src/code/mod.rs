//! Program disassembly and verification
//!
//! Operands are self-describing, so a program can be walked without
//! executing it. The walk backs both the load-time verifier and the
//! human-readable dump.
//!
//! # Modules
//!
//! - `dump`: full binary listing

pub mod dump;

pub use dump::BinaryDump;

use crate::extension::{ExtId, ExtensionRegistry};
use crate::objects::ObjectClass;
use crate::objects::ObjRef;
use crate::opcode::{
    operand_class_name, OpCode, OperandLayout, OBJECT_EXTENSION, OPERAND_CATENATED,
    OPERAND_CUSTOM, OPERAND_NUMBER, OPERAND_OMITTED, OPERAND_STRING, OPERAND_STRING_LIST,
    OPT_ADDRESS_PART, OPT_COMPARATOR, OPT_END, OPT_MATCH_TYPE, OPT_SIDE_EFFECT, OP_CUSTOM,
};
use sieve_binary::{Binary, BinaryError, CodeError, CodeReader};
use std::collections::HashSet;
use std::fmt;

/// Resolve a binary's linkage table against the registry
///
/// Every linked extension must be registered with the same version.
pub fn link_extensions(registry: &ExtensionRegistry, binary: &Binary) -> Result<Vec<ExtId>, BinaryError> {
    binary
        .extensions()
        .iter()
        .map(|linked| {
            registry
                .lookup(&linked.name)
                .filter(|id| registry.get(*id).is_some_and(|def| def.version == linked.version))
                .ok_or_else(|| BinaryError::IncompatibleExtension {
                    name: linked.name.clone(),
                    version: linked.version,
                })
        })
        .collect()
}

/// One decoded operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOperation {
    pub address: usize,
    pub mnemonic: String,
    pub operands: Vec<String>,
    /// Absolute target of a jump
    pub jump_target: Option<usize>,
    /// Address of the next operation
    pub end: usize,
}

impl fmt::Display for DecodedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}: {}", self.address, self.mnemonic)?;
        if let Some(target) = self.jump_target {
            write!(f, " {:08x}", target)?;
        }
        for operand in &self.operands {
            write!(f, "\n            {}", operand)?;
        }
        Ok(())
    }
}

pub struct Disassembler<'a> {
    registry: &'a ExtensionRegistry,
    ext_map: &'a [ExtId],
    code: CodeReader<'a>,
}

impl<'a> Disassembler<'a> {
    pub fn new(registry: &'a ExtensionRegistry, ext_map: &'a [ExtId], code: CodeReader<'a>) -> Self {
        Self {
            registry,
            ext_map,
            code,
        }
    }

    fn extension(&self, index: usize, address: usize) -> Result<ExtId, CodeError> {
        self.ext_map
            .get(index)
            .copied()
            .ok_or_else(|| CodeError::malformed(address, format!("no extension linked at index {}", index)))
    }

    fn read_linked_extension(&self, pos: &mut usize) -> Result<ExtId, CodeError> {
        let start = *pos;
        let index = self.code.read_count(pos, self.ext_map.len())?;
        self.extension(index, start)
    }

    /// Decode the operation starting at `address`
    pub fn decode(&self, address: usize) -> Result<DecodedOperation, CodeError> {
        let mut pos = address;
        let byte = self.code.read_byte(&mut pos)?;

        let (mnemonic, layout): (String, OperandLayout) = if byte >= OP_CUSTOM {
            let ext = self.extension(usize::from(byte - OP_CUSTOM), address)?;
            let code = self.code.read_byte(&mut pos)?;
            let def = self
                .registry
                .get(ext)
                .ok_or_else(|| CodeError::malformed(address, format!("extension {} is not registered", ext)))?;
            let op = def.operation(code).ok_or_else(|| {
                CodeError::malformed(address, format!("unknown operation {} of extension {}", code, def.name))
            })?;
            (op.mnemonic.to_string(), op.layout)
        } else {
            let op = OpCode::from_u8(byte).ok_or_else(|| {
                CodeError::malformed(address, format!("unknown operation code {}", byte))
            })?;
            (op.name().to_string(), op.layout())
        };

        let jump_target = if layout.jump {
            Some(self.code.read_offset(&mut pos)?)
        } else {
            None
        };

        let mut operands = Vec::with_capacity(layout.operands);
        for _ in 0..layout.operands {
            operands.push(self.describe_operand(&mut pos)?);
        }
        if layout.optionals {
            self.describe_optionals(&mut pos, &mut operands)?;
        }

        Ok(DecodedOperation {
            address,
            mnemonic,
            operands,
            jump_target,
            end: pos,
        })
    }

    /// Decode every operation in order
    pub fn operations(&self) -> Result<Vec<DecodedOperation>, CodeError> {
        let mut ops = Vec::new();
        let mut address = 0;
        while address < self.code.len() {
            let op = self.decode(address)?;
            address = op.end;
            ops.push(op);
        }
        Ok(ops)
    }

    /// Check that the program decodes and every jump is forward and lands
    /// on an operation boundary or the end of the program
    pub fn verify(&self) -> Result<(), CodeError> {
        let ops = self.operations()?;
        let boundaries: HashSet<usize> = ops.iter().map(|op| op.address).collect();

        for op in &ops {
            let Some(target) = op.jump_target else {
                continue;
            };
            if target < op.end {
                return Err(CodeError::malformed(
                    op.address,
                    format!("backward jump to {}", target),
                ));
            }
            if target != self.code.len() && !boundaries.contains(&target) {
                return Err(CodeError::malformed(
                    op.address,
                    format!("jump target {} is not an operation boundary", target),
                ));
            }
        }
        Ok(())
    }

    /// Write one line group per operation
    pub fn write_listing(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mut address = 0;
        while address < self.code.len() {
            match self.decode(address) {
                Ok(op) => {
                    writeln!(out, "{}", op)?;
                    address = op.end;
                }
                Err(e) => {
                    writeln!(out, "{:08x}: <decode error: {}>", address, e)?;
                    break;
                }
            }
        }
        writeln!(out, "{:08x}: [end]", self.code.len())
    }

    // ===== Operands =====

    fn describe_operand(&self, pos: &mut usize) -> Result<String, CodeError> {
        let start = *pos;
        let class = self.code.read_byte(pos)?;
        match class {
            OPERAND_OMITTED => Ok("(omitted)".to_string()),
            OPERAND_NUMBER => Ok(format!("number {}", self.code.read_integer(pos)?)),
            OPERAND_STRING => Ok(format!("string {:?}", self.code.read_str(pos)?)),
            OPERAND_STRING_LIST => {
                let count = self.code.read_count(pos, self.code.len())?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.describe_string(pos)?);
                }
                Ok(format!("string list [{}]", items.join(", ")))
            }
            OPERAND_CATENATED => Ok(format!("string {}", self.describe_catenated(pos)?)),
            OPERAND_CUSTOM => self.describe_custom(pos),
            _ => match ObjectClass::from_operand_class(class) {
                Some(object_class) => self.describe_object(object_class, pos),
                None => Err(CodeError::malformed(
                    start,
                    format!("invalid operand class {}", class),
                )),
            },
        }
    }

    /// A string list member: plain, catenated or custom
    fn describe_string(&self, pos: &mut usize) -> Result<String, CodeError> {
        let start = *pos;
        match self.code.read_byte(pos)? {
            OPERAND_STRING => Ok(format!("{:?}", self.code.read_str(pos)?)),
            OPERAND_CATENATED => self.describe_catenated(pos),
            OPERAND_CUSTOM => self.describe_custom(pos),
            class => Err(CodeError::malformed(
                start,
                format!(
                    "expected string, found {}",
                    operand_class_name(class).unwrap_or("invalid class")
                ),
            )),
        }
    }

    fn describe_catenated(&self, pos: &mut usize) -> Result<String, CodeError> {
        let count = self.code.read_count(pos, self.code.len())?;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let start = *pos;
            match self.code.read_byte(pos)? {
                OPERAND_STRING => parts.push(format!("{:?}", self.code.read_str(pos)?)),
                OPERAND_CUSTOM => parts.push(self.describe_custom(pos)?),
                class => {
                    return Err(CodeError::malformed(
                        start,
                        format!("invalid string part class {}", class),
                    ))
                }
            }
        }
        Ok(format!("cat({})", parts.join(" . ")))
    }

    fn describe_custom(&self, pos: &mut usize) -> Result<String, CodeError> {
        let start = *pos;
        let ext = self.read_linked_extension(pos)?;
        let code = self.code.read_byte(pos)?;
        let operand = self
            .registry
            .get(ext)
            .and_then(|def| def.operand(code))
            .ok_or_else(|| {
                CodeError::malformed(start, format!("unknown operand {} of extension {}", code, ext))
            })?;
        let data = (operand.describe)(self.code, pos)?;
        Ok(format!("{} {}", operand.name, data))
    }

    fn describe_object(&self, class: ObjectClass, pos: &mut usize) -> Result<String, CodeError> {
        let start = *pos;
        let obj = match self.code.read_byte(pos)? {
            OBJECT_EXTENSION => {
                let ext = self.read_linked_extension(pos)?;
                ObjRef::ext(ext, self.code.read_byte(pos)?)
            }
            code => ObjRef::core(code),
        };
        let object = self
            .registry
            .object(class, obj)
            .ok_or_else(|| CodeError::malformed(start, format!("unknown {} {:?}", class.name(), obj)))?;
        Ok(format!("{}: {}", class.name(), object.describe()))
    }

    fn describe_optionals(&self, pos: &mut usize, out: &mut Vec<String>) -> Result<(), CodeError> {
        let start = *pos;
        if self.code.read_byte(pos)? != OPT_END {
            return Err(CodeError::malformed(start, "missing optional operand block"));
        }
        loop {
            let code_address = *pos;
            let code = self.code.read_byte(pos)?;
            let expected = match code {
                OPT_END => return Ok(()),
                OPT_COMPARATOR => Some(ObjectClass::Comparator),
                OPT_ADDRESS_PART => Some(ObjectClass::AddressPart),
                OPT_MATCH_TYPE => Some(ObjectClass::MatchType),
                OPT_SIDE_EFFECT => Some(ObjectClass::SideEffect),
                _ => None,
            };
            let operand_address = *pos;
            let described = self.describe_operand(pos)?;
            if let Some(class) = expected {
                if self.code.peek_byte(operand_address) != Some(class.operand_class()) {
                    return Err(CodeError::malformed(
                        code_address,
                        format!("optional operand {} is not a {}", code, class.name()),
                    ));
                }
                out.push(described);
            } else {
                out.push(format!("[{}] {}", code, described));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_binary::CodeBuffer;

    fn disassemble(buf: &CodeBuffer) -> (ExtensionRegistry, Vec<u8>) {
        (ExtensionRegistry::new(), buf.as_slice().to_vec())
    }

    #[test]
    fn test_decode_header_operation() {
        let mut buf = CodeBuffer::new();
        buf.emit_byte(OpCode::Header.as_u8());
        buf.emit_byte(OPERAND_STRING_LIST);
        buf.emit_integer(1);
        buf.emit_byte(OPERAND_STRING);
        buf.emit_string("subject");
        buf.emit_byte(OPERAND_STRING);
        buf.emit_string("offer");
        buf.emit_byte(OPT_END);
        buf.emit_byte(OPT_MATCH_TYPE);
        buf.emit_byte(crate::opcode::OPERAND_MATCH_TYPE);
        buf.emit_byte(crate::objects::MATCH_CONTAINS);
        buf.emit_byte(OPT_END);

        let (registry, data) = disassemble(&buf);
        let dis = Disassembler::new(&registry, &[], CodeReader::new(&data));
        let op = dis.decode(0).unwrap();
        assert_eq!(op.mnemonic, "HEADER");
        assert_eq!(op.end, data.len());
        assert_eq!(
            op.operands,
            vec![
                "string list [\"subject\"]".to_string(),
                "string \"offer\"".to_string(),
                "match type: :contains".to_string(),
            ]
        );
        assert!(dis.verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_jump_into_operation() {
        let mut buf = CodeBuffer::new();
        buf.emit_byte(OpCode::Jmp.as_u8());
        let offset = buf.emit_offset(0);
        buf.emit_byte(OpCode::SizeOver.as_u8());
        buf.emit_byte(OPERAND_NUMBER);
        buf.emit_integer(10);
        // points at the operand of SIZE-OVER
        assert!(buf.resolve_offset(offset, 6));

        let (registry, data) = disassemble(&buf);
        let dis = Disassembler::new(&registry, &[], CodeReader::new(&data));
        let err = dis.verify().unwrap_err();
        assert!(err.to_string().contains("not an operation boundary"));
    }

    #[test]
    fn test_verify_rejects_backward_jump() {
        let mut buf = CodeBuffer::new();
        buf.emit_byte(OpCode::Keep.as_u8());
        buf.emit_byte(OpCode::Jmp.as_u8());
        let offset = buf.emit_offset(0);
        assert!(buf.resolve_offset(offset, 0));

        let (registry, data) = disassemble(&buf);
        let dis = Disassembler::new(&registry, &[], CodeReader::new(&data));
        assert!(dis.verify().is_err());
    }

    #[test]
    fn test_unknown_extension_operation() {
        let data = vec![OP_CUSTOM, 0];
        let registry = ExtensionRegistry::new();
        let dis = Disassembler::new(&registry, &[], CodeReader::new(&data));
        assert!(matches!(dis.decode(0), Err(CodeError::Malformed { address: 0, .. })));
    }
}
