//! Comparator capabilities
//!
//! `i;octet` and `i;ascii-casemap` are implicit and keep their core object
//! codes, so binaries refer to them without an extension prefix.
//! `i;ascii-numeric` and `i;unicode-casemap` must be required.

use crate::compiler::validator::Validator;
use crate::extension::{ExtId, ExtensionDef};
use crate::objects::comparator::{
    ASCII_CASEMAP as ASCII_CASEMAP_CMP, ASCII_NUMERIC as ASCII_NUMERIC_CMP, OCTET as OCTET_CMP,
    UNICODE_CASEMAP as UNICODE_CASEMAP_CMP,
};
use crate::objects::{Comparator, Object, ObjectClass};

pub static OCTET: ExtensionDef = ExtensionDef {
    name: "comparator-i;octet",
    implicit: true,
    validator_load: load_octet,
    ..ExtensionDef::EMPTY
};

pub static ASCII_CASEMAP: ExtensionDef = ExtensionDef {
    name: "comparator-i;ascii-casemap",
    implicit: true,
    validator_load: load_ascii_casemap,
    ..ExtensionDef::EMPTY
};

pub static ASCII_NUMERIC: ExtensionDef = ExtensionDef {
    name: "comparator-i;ascii-numeric",
    validator_load: load_ascii_numeric,
    objects: ascii_numeric_objects,
    ..ExtensionDef::EMPTY
};

pub static UNICODE_CASEMAP: ExtensionDef = ExtensionDef {
    name: "comparator-i;unicode-casemap",
    validator_load: load_unicode_casemap,
    objects: unicode_casemap_objects,
    ..ExtensionDef::EMPTY
};

fn load_octet(v: &mut Validator<'_>, _ext: ExtId) -> bool {
    v.register_comparator(None, &OCTET_CMP);
    true
}

fn load_ascii_casemap(v: &mut Validator<'_>, _ext: ExtId) -> bool {
    v.register_comparator(None, &ASCII_CASEMAP_CMP);
    true
}

fn load_ascii_numeric(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_comparator(Some(ext), &ASCII_NUMERIC_CMP);
    true
}

fn load_unicode_casemap(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_comparator(Some(ext), &UNICODE_CASEMAP_CMP);
    true
}

fn single_comparator(class: ObjectClass, code: u8, comparator: &'static dyn Comparator) -> Option<Object> {
    (class == ObjectClass::Comparator && code == comparator.code())
        .then_some(Object::Comparator(comparator))
}

fn ascii_numeric_objects(class: ObjectClass, code: u8) -> Option<Object> {
    single_comparator(class, code, &ASCII_NUMERIC_CMP)
}

fn unicode_casemap_objects(class: ObjectClass, code: u8) -> Option<Object> {
    single_comparator(class, code, &UNICODE_CASEMAP_CMP)
}
