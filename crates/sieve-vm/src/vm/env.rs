//! Runtime environment
//!
//! [`RuntimeEnv`] is what execute hooks see: the program reader, the
//! message, the result under construction and the per-run state. Operand
//! readers check the class byte of every operand and report a corrupt
//! binary on any mismatch.

use crate::error::RuntimeError;
use crate::extension::{ExtId, ExtensionRegistry};
use crate::message::{MessageContext, MessageSource};
use crate::objects::{
    self, ActionOptions, AddressPart, Comparator, MatchType, MatchValues, ObjRef, Object,
    ObjectClass, SideEffect,
};
use crate::opcode::{
    OBJECT_EXTENSION, OPERAND_CATENATED, OPERAND_CUSTOM, OPERAND_NUMBER, OPERAND_OMITTED,
    OPERAND_STRING, OPERAND_STRING_LIST, OPT_ADDRESS_PART, OPT_COMPARATOR, OPT_CUSTOM, OPT_END,
    OPT_MATCH_TYPE, OPT_SIDE_EFFECT,
};
use crate::result::ScriptResult;
use crate::settings::Settings;
use crate::trace::Tracer;
use crate::vm::ExtContexts;
use sieve_binary::CodeReader;

pub struct RuntimeEnv<'a, 'm> {
    pub registry: &'a ExtensionRegistry,
    pub settings: &'a Settings,
    pub code: CodeReader<'a>,
    pub(crate) ext_map: &'a [ExtId],
    pub message: &'a mut (dyn MessageSource + 'm),
    pub msgctx: &'a mut MessageContext,
    pub trace: &'a mut Tracer,
    pub result: ScriptResult,
    pub match_values: MatchValues,
    /// Per-run extension state
    pub contexts: ExtContexts,
    /// Address of the operation being executed
    pub op_address: usize,
    /// Outcome of the last test operation
    pub test_result: bool,
    pub interrupted: bool,
}

/// Optional operands of one operation
#[derive(Default, Clone)]
pub struct Optionals {
    pub comparator: Option<&'static dyn Comparator>,
    pub match_type: Option<&'static dyn MatchType>,
    pub address_part: Option<&'static dyn AddressPart>,
    pub side_effects: Vec<&'static dyn SideEffect>,
}

impl Optionals {
    pub fn comparator(&self) -> &'static dyn Comparator {
        self.comparator.unwrap_or_else(objects::default_comparator)
    }

    pub fn match_type(&self) -> &'static dyn MatchType {
        self.match_type.unwrap_or_else(objects::default_match_type)
    }

    pub fn address_part(&self) -> &'static dyn AddressPart {
        self.address_part.unwrap_or_else(objects::default_address_part)
    }

    /// Modifiers produced by the side effects
    pub fn action_options(&self) -> ActionOptions {
        let mut options = ActionOptions::default();
        for effect in &self.side_effects {
            effect.apply(&mut options);
        }
        options
    }
}

impl<'a, 'm> RuntimeEnv<'a, 'm> {
    /// Registry id of the extension linked at `index`
    pub fn extension(&self, index: usize, address: usize) -> Result<ExtId, RuntimeError> {
        self.ext_map.get(index).copied().ok_or_else(|| {
            RuntimeError::corrupt(address, format!("no extension linked at index {}", index))
        })
    }

    fn read_linked_extension(&self, address: &mut usize) -> Result<ExtId, RuntimeError> {
        let start = *address;
        let index = self.code.read_count(address, self.ext_map.len())?;
        self.extension(index, start)
    }

    // ===== Plain operands =====

    pub fn read_number(&mut self, address: &mut usize) -> Result<u64, RuntimeError> {
        let start = *address;
        match self.code.read_byte(address)? {
            OPERAND_NUMBER => Ok(self.code.read_integer(address)?),
            class => Err(class_mismatch(start, "number", class)),
        }
    }

    /// Read a string operand, evaluating catenated and custom strings
    pub fn read_string(&mut self, address: &mut usize) -> Result<String, RuntimeError> {
        let start = *address;
        let class = self.code.read_byte(address)?;
        self.read_string_body(class, start, address)
    }

    fn read_string_body(
        &mut self,
        class: u8,
        start: usize,
        address: &mut usize,
    ) -> Result<String, RuntimeError> {
        match class {
            OPERAND_STRING => Ok(self.code.read_string(address)?),
            OPERAND_CATENATED => {
                let count = self.code.read_count(address, self.code.len())?;
                let mut out = String::new();
                for _ in 0..count {
                    let part_start = *address;
                    match self.code.read_byte(address)? {
                        OPERAND_STRING => out.push_str(self.code.read_str(address)?),
                        OPERAND_CUSTOM => out.push_str(&self.read_custom_string(address)?),
                        other => return Err(class_mismatch(part_start, "string part", other)),
                    }
                }
                Ok(out)
            }
            OPERAND_CUSTOM => self.read_custom_string(address),
            other => Err(class_mismatch(start, "string", other)),
        }
    }

    /// Evaluate a custom operand as a string; the class byte is consumed
    pub fn read_custom_string(&mut self, address: &mut usize) -> Result<String, RuntimeError> {
        let start = *address;
        let ext = self.read_linked_extension(address)?;
        let code = self.code.read_byte(address)?;
        let operand = self
            .registry
            .get(ext)
            .and_then(|def| def.operand(code))
            .ok_or_else(|| {
                RuntimeError::corrupt(start, format!("unknown operand {} of extension {}", code, ext))
            })?;
        (operand.read_string)(self, ext, address)
    }

    /// Read a string list
    ///
    /// The generator always emits list arguments as lists, so any other
    /// class here means the binary is corrupt.
    pub fn read_string_list(&mut self, address: &mut usize) -> Result<Vec<String>, RuntimeError> {
        let start = *address;
        let class = self.code.read_byte(address)?;
        if class != OPERAND_STRING_LIST {
            return Err(class_mismatch(start, "string list", class));
        }
        let count = self.code.read_count(address, self.code.len())?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.read_string(address)?);
        }
        Ok(items)
    }

    /// Read a string list that may be omitted
    pub fn read_optional_string_list(
        &mut self,
        address: &mut usize,
    ) -> Result<Option<Vec<String>>, RuntimeError> {
        if self.code.peek_byte(*address) == Some(OPERAND_OMITTED) {
            *address += 1;
            return Ok(None);
        }
        self.read_string_list(address).map(Some)
    }

    /// Read a custom operand's data without evaluating it
    pub fn read_custom_operand(&mut self, address: &mut usize) -> Result<(ExtId, u8, u64), RuntimeError> {
        let start = *address;
        match self.code.read_byte(address)? {
            OPERAND_CUSTOM => {
                let ext = self.read_linked_extension(address)?;
                let code = self.code.read_byte(address)?;
                let data = self.code.read_integer(address)?;
                Ok((ext, code, data))
            }
            class => Err(class_mismatch(start, "custom operand", class)),
        }
    }

    // ===== Objects =====

    pub fn read_object(&mut self, class: ObjectClass, address: &mut usize) -> Result<Object, RuntimeError> {
        let start = *address;
        let found = self.code.read_byte(address)?;
        if found != class.operand_class() {
            return Err(class_mismatch(start, class.name(), found));
        }
        self.read_object_ref(class, address)
    }

    fn read_object_ref(&mut self, class: ObjectClass, address: &mut usize) -> Result<Object, RuntimeError> {
        let start = *address;
        let obj = match self.code.read_byte(address)? {
            OBJECT_EXTENSION => {
                let ext = self.read_linked_extension(address)?;
                ObjRef::ext(ext, self.code.read_byte(address)?)
            }
            code => ObjRef::core(code),
        };
        self.registry.object(class, obj).ok_or_else(|| {
            RuntimeError::corrupt(start, format!("unknown {} {:?}", class.name(), obj))
        })
    }

    // ===== Optional operands =====

    /// Read an optional block; codes from [`OPT_CUSTOM`] on go to `custom`
    pub fn read_optionals<F>(&mut self, address: &mut usize, mut custom: F) -> Result<Optionals, RuntimeError>
    where
        F: FnMut(&mut Self, u8, &mut usize) -> Result<(), RuntimeError>,
    {
        let start = *address;
        let marker = self.code.read_byte(address)?;
        if marker != OPT_END {
            return Err(RuntimeError::corrupt(
                start,
                format!("expected optional operand block, found byte {}", marker),
            ));
        }

        let mut opts = Optionals::default();
        loop {
            let code_address = *address;
            match self.code.read_byte(address)? {
                OPT_END => break,
                OPT_COMPARATOR => match self.read_object(ObjectClass::Comparator, address)? {
                    Object::Comparator(c) => opts.comparator = Some(c),
                    other => return Err(object_mismatch(code_address, other)),
                },
                OPT_MATCH_TYPE => match self.read_object(ObjectClass::MatchType, address)? {
                    Object::MatchType(m) => opts.match_type = Some(m),
                    other => return Err(object_mismatch(code_address, other)),
                },
                OPT_ADDRESS_PART => match self.read_object(ObjectClass::AddressPart, address)? {
                    Object::AddressPart(a) => opts.address_part = Some(a),
                    other => return Err(object_mismatch(code_address, other)),
                },
                OPT_SIDE_EFFECT => match self.read_object(ObjectClass::SideEffect, address)? {
                    Object::SideEffect(s) => opts.side_effects.push(s),
                    other => return Err(object_mismatch(code_address, other)),
                },
                code if code >= OPT_CUSTOM => custom(self, code, address)?,
                code => {
                    return Err(RuntimeError::corrupt(
                        code_address,
                        format!("invalid optional operand code {}", code),
                    ))
                }
            }
        }
        Ok(opts)
    }

    /// Read an optional block without command-specific codes
    pub fn read_core_optionals(&mut self, address: &mut usize) -> Result<Optionals, RuntimeError> {
        self.read_optionals(address, |_, code, at| {
            Err(RuntimeError::corrupt(
                *at - 1,
                format!("unexpected optional operand code {}", code),
            ))
        })
    }
}

fn class_mismatch(address: usize, expected: &str, found: u8) -> RuntimeError {
    let found = crate::opcode::operand_class_name(found)
        .map(str::to_string)
        .unwrap_or_else(|| format!("byte {}", found));
    RuntimeError::corrupt(address, format!("expected {} operand, found {}", expected, found))
}

fn object_mismatch(address: usize, found: Object) -> RuntimeError {
    RuntimeError::corrupt(address, format!("unexpected object {:?}", found))
}
