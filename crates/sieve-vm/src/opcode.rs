//! Operation and operand codes
//!
//! The main program is a flat sequence of operations. Each operation starts
//! with one code byte:
//!
//! - below [`OP_CUSTOM`]: a core [`OpCode`]
//! - [`OP_CUSTOM`] + n: an operation of the extension linked at index n,
//!   followed by the extension's own operation code byte
//!
//! Operands are self-describing: a class byte (`OPERAND_*`) precedes every
//! value so that the disassembler can walk any program without knowing the
//! operation semantics.

use std::fmt;

/// First code byte of extension operations
pub const OP_CUSTOM: u8 = 0x20;

// ===== Operand classes =====

/// Optional argument not given
pub const OPERAND_OMITTED: u8 = 0;
/// Variable-length number
pub const OPERAND_NUMBER: u8 = 1;
/// Literal string
pub const OPERAND_STRING: u8 = 2;
/// Count followed by string operands
pub const OPERAND_STRING_LIST: u8 = 3;
/// Comparator reference
pub const OPERAND_COMPARATOR: u8 = 4;
/// Match type reference
pub const OPERAND_MATCH_TYPE: u8 = 5;
/// Address part reference
pub const OPERAND_ADDRESS_PART: u8 = 6;
/// Side effect reference
pub const OPERAND_SIDE_EFFECT: u8 = 7;
/// Count followed by string parts, concatenated at runtime
pub const OPERAND_CATENATED: u8 = 8;
/// Extension index, operand code, extension data
pub const OPERAND_CUSTOM: u8 = 9;

/// Object reference byte announcing an extension object
pub const OBJECT_EXTENSION: u8 = 0xff;

// ===== Optional operand codes =====

/// Start of an optional block and its terminator
pub const OPT_END: u8 = 0;
pub const OPT_COMPARATOR: u8 = 1;
pub const OPT_ADDRESS_PART: u8 = 2;
pub const OPT_MATCH_TYPE: u8 = 3;
pub const OPT_SIDE_EFFECT: u8 = 4;
/// First code available to command-specific optionals
pub const OPT_CUSTOM: u8 = 5;

/// Shape of an operation's operands, used by the disassembler and the
/// load-time verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandLayout {
    /// Positional operands
    pub operands: usize,
    /// An optional block follows the positional operands
    pub optionals: bool,
    /// A jump offset follows the code byte
    pub jump: bool,
}

impl OperandLayout {
    pub const fn new(operands: usize, optionals: bool) -> Self {
        Self {
            operands,
            optionals,
            jump: false,
        }
    }

    pub const fn jump() -> Self {
        Self {
            operands: 0,
            optionals: false,
            jump: true,
        }
    }
}

/// Core operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // ===== Control =====
    /// Unconditional jump
    Jmp = 1,
    /// Jump when the last test succeeded
    JmpTrue = 2,
    /// Jump when the last test failed
    JmpFalse = 3,
    /// Interrupt execution
    Stop = 4,

    // ===== Actions =====
    Keep = 5,
    Discard = 6,
    /// Address, optionals
    Redirect = 7,

    // ===== Tests =====
    /// Header list, key list, optionals
    Address = 8,
    /// Header list, key list, optionals
    Header = 9,
    /// Header list
    Exists = 10,
    /// Limit
    SizeOver = 11,
    /// Limit
    SizeUnder = 12,
}

impl OpCode {
    /// Convert from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(OpCode::Jmp),
            2 => Some(OpCode::JmpTrue),
            3 => Some(OpCode::JmpFalse),
            4 => Some(OpCode::Stop),
            5 => Some(OpCode::Keep),
            6 => Some(OpCode::Discard),
            7 => Some(OpCode::Redirect),
            8 => Some(OpCode::Address),
            9 => Some(OpCode::Header),
            10 => Some(OpCode::Exists),
            11 => Some(OpCode::SizeOver),
            12 => Some(OpCode::SizeUnder),
            _ => None,
        }
    }

    /// Convert to u8
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get opcode name
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Jmp => "JMP",
            OpCode::JmpTrue => "JMPTRUE",
            OpCode::JmpFalse => "JMPFALSE",
            OpCode::Stop => "STOP",
            OpCode::Keep => "KEEP",
            OpCode::Discard => "DISCARD",
            OpCode::Redirect => "REDIRECT",
            OpCode::Address => "ADDRESS",
            OpCode::Header => "HEADER",
            OpCode::Exists => "EXISTS",
            OpCode::SizeOver => "SIZE-OVER",
            OpCode::SizeUnder => "SIZE-UNDER",
        }
    }

    pub fn layout(self) -> OperandLayout {
        match self {
            OpCode::Jmp | OpCode::JmpTrue | OpCode::JmpFalse => OperandLayout::jump(),
            OpCode::Stop | OpCode::Keep | OpCode::Discard => OperandLayout::new(0, false),
            OpCode::Redirect => OperandLayout::new(1, true),
            OpCode::Address | OpCode::Header => OperandLayout::new(2, true),
            OpCode::Exists | OpCode::SizeOver | OpCode::SizeUnder => OperandLayout::new(1, false),
        }
    }

    /// Whether the operation leaves a result in the test register
    pub fn is_test(self) -> bool {
        matches!(
            self,
            OpCode::Address | OpCode::Header | OpCode::Exists | OpCode::SizeOver | OpCode::SizeUnder
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Name of an operand class byte
pub fn operand_class_name(class: u8) -> Option<&'static str> {
    let name = match class {
        OPERAND_OMITTED => "OMITTED",
        OPERAND_NUMBER => "NUMBER",
        OPERAND_STRING => "STRING",
        OPERAND_STRING_LIST => "STRING-LIST",
        OPERAND_COMPARATOR => "COMPARATOR",
        OPERAND_MATCH_TYPE => "MATCH-TYPE",
        OPERAND_ADDRESS_PART => "ADDRESS-PART",
        OPERAND_SIDE_EFFECT => "SIDE-EFFECT",
        OPERAND_CATENATED => "CATENATED-STRING",
        OPERAND_CUSTOM => "CUSTOM",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(OpCode::Header.as_u8(), 9);
        assert_eq!(OpCode::from_u8(9), Some(OpCode::Header));
        assert_eq!(OpCode::from_u8(0), None);
        assert_eq!(OpCode::from_u8(OP_CUSTOM), None);
    }

    #[test]
    fn test_all_core_codes_below_custom() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_u8(byte) {
                assert!(op.as_u8() < OP_CUSTOM, "{} collides with extension codes", op);
                assert_eq!(op.as_u8(), byte);
            }
        }
    }

    #[test]
    fn test_layouts() {
        assert!(OpCode::JmpFalse.layout().jump);
        assert_eq!(OpCode::Header.layout(), OperandLayout::new(2, true));
        assert!(OpCode::SizeOver.is_test());
        assert!(!OpCode::Redirect.is_test());
    }
}
