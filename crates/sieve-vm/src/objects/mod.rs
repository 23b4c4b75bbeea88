//! Capability objects
//!
//! Comparators, match types, address parts and side effects are stateless
//! `&'static dyn` objects. Core objects are addressed by a code byte alone;
//! extension objects by the owning extension plus a code byte. Each class
//! has its own code space.
//!
//! # Modules
//!
//! - `comparator`: comparator trait and the four built-in comparators
//! - `match_type`: match type trait, match context and match values
//! - `glob`: `:matches` wildcard engine
//! - `regex`: `:regex` match type
//! - `relational`: `:value` / `:count` match types
//! - `address_part`: address part trait and implementations
//! - `side_effect`: action side effects (`:copy`)

pub mod address_part;
pub mod comparator;
pub mod glob;
pub mod match_type;
pub mod regex;
pub mod relational;
pub mod side_effect;

use crate::extension::ExtId;
use crate::opcode::{
    OPERAND_ADDRESS_PART, OPERAND_COMPARATOR, OPERAND_MATCH_TYPE, OPERAND_SIDE_EFFECT,
};
use std::fmt;

pub use address_part::AddressPart;
pub use comparator::{Comparator, ComparatorFlags};
pub use match_type::{MatchContext, MatchError, MatchType, MatchValues};
pub use side_effect::{ActionOptions, SideEffect};

/// Object class, each with its own code space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Comparator,
    MatchType,
    AddressPart,
    SideEffect,
}

impl ObjectClass {
    pub fn name(self) -> &'static str {
        match self {
            ObjectClass::Comparator => "comparator",
            ObjectClass::MatchType => "match type",
            ObjectClass::AddressPart => "address part",
            ObjectClass::SideEffect => "side effect",
        }
    }

    /// Operand class byte announcing an object of this class
    pub fn operand_class(self) -> u8 {
        match self {
            ObjectClass::Comparator => OPERAND_COMPARATOR,
            ObjectClass::MatchType => OPERAND_MATCH_TYPE,
            ObjectClass::AddressPart => OPERAND_ADDRESS_PART,
            ObjectClass::SideEffect => OPERAND_SIDE_EFFECT,
        }
    }

    pub fn from_operand_class(class: u8) -> Option<Self> {
        match class {
            OPERAND_COMPARATOR => Some(ObjectClass::Comparator),
            OPERAND_MATCH_TYPE => Some(ObjectClass::MatchType),
            OPERAND_ADDRESS_PART => Some(ObjectClass::AddressPart),
            OPERAND_SIDE_EFFECT => Some(ObjectClass::SideEffect),
            _ => None,
        }
    }
}

/// Identity of an object: owning extension (`None` for core) and code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub ext: Option<ExtId>,
    pub code: u8,
}

impl ObjRef {
    pub const fn core(code: u8) -> Self {
        Self { ext: None, code }
    }

    pub const fn ext(ext: ExtId, code: u8) -> Self {
        Self {
            ext: Some(ext),
            code,
        }
    }
}

/// A resolved capability object
#[derive(Clone, Copy)]
pub enum Object {
    Comparator(&'static dyn Comparator),
    MatchType(&'static dyn MatchType),
    AddressPart(&'static dyn AddressPart),
    SideEffect(&'static dyn SideEffect),
}

impl Object {
    pub fn class(&self) -> ObjectClass {
        match self {
            Object::Comparator(_) => ObjectClass::Comparator,
            Object::MatchType(_) => ObjectClass::MatchType,
            Object::AddressPart(_) => ObjectClass::AddressPart,
            Object::SideEffect(_) => ObjectClass::SideEffect,
        }
    }

    /// Human-readable name, as shown in dumps
    pub fn describe(&self) -> String {
        match self {
            Object::Comparator(c) => c.identifier().to_string(),
            Object::MatchType(m) => m.describe(),
            Object::AddressPart(a) => a.identifier().to_string(),
            Object::SideEffect(s) => s.identifier().to_string(),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class().name(), self.describe())
    }
}

// ===== Core object tables =====

pub const COMPARATOR_OCTET: u8 = 0;
pub const COMPARATOR_ASCII_CASEMAP: u8 = 1;

pub const MATCH_IS: u8 = 0;
pub const MATCH_CONTAINS: u8 = 1;
pub const MATCH_MATCHES: u8 = 2;

pub const ADDRESS_ALL: u8 = 0;
pub const ADDRESS_LOCALPART: u8 = 1;
pub const ADDRESS_DOMAIN: u8 = 2;

/// Look up a core object by class and code
pub fn core_object(class: ObjectClass, code: u8) -> Option<Object> {
    match class {
        ObjectClass::Comparator => match code {
            COMPARATOR_OCTET => Some(Object::Comparator(&comparator::OCTET)),
            COMPARATOR_ASCII_CASEMAP => Some(Object::Comparator(&comparator::ASCII_CASEMAP)),
            _ => None,
        },
        ObjectClass::MatchType => match code {
            MATCH_IS => Some(Object::MatchType(&match_type::IS)),
            MATCH_CONTAINS => Some(Object::MatchType(&match_type::CONTAINS)),
            MATCH_MATCHES => Some(Object::MatchType(&match_type::MATCHES)),
            _ => None,
        },
        ObjectClass::AddressPart => match code {
            ADDRESS_ALL => Some(Object::AddressPart(&address_part::ALL)),
            ADDRESS_LOCALPART => Some(Object::AddressPart(&address_part::LOCALPART)),
            ADDRESS_DOMAIN => Some(Object::AddressPart(&address_part::DOMAIN)),
            _ => None,
        },
        ObjectClass::SideEffect => None,
    }
}

/// Default comparator when `:comparator` is absent
pub fn default_comparator() -> &'static dyn Comparator {
    &comparator::ASCII_CASEMAP
}

/// Default match type when no match type tag is given
pub fn default_match_type() -> &'static dyn MatchType {
    &match_type::IS
}

/// Default address part when no address part tag is given
pub fn default_address_part() -> &'static dyn AddressPart {
    &address_part::ALL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_lookup() {
        match core_object(ObjectClass::Comparator, COMPARATOR_OCTET) {
            Some(Object::Comparator(c)) => assert_eq!(c.identifier(), "i;octet"),
            other => panic!("Expected comparator, got {:?}", other),
        }
        assert!(core_object(ObjectClass::MatchType, 9).is_none());
        assert!(core_object(ObjectClass::SideEffect, 0).is_none());
    }

    #[test]
    fn test_operand_class_round_trip() {
        for class in [
            ObjectClass::Comparator,
            ObjectClass::MatchType,
            ObjectClass::AddressPart,
            ObjectClass::SideEffect,
        ] {
            assert_eq!(ObjectClass::from_operand_class(class.operand_class()), Some(class));
        }
    }
}
