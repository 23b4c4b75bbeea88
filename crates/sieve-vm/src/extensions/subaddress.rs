//! `:user` and `:detail`

use crate::compiler::validator::Validator;
use crate::extension::{ExtId, ExtensionDef};
use crate::objects::address_part::{ADDRESS_DETAIL, ADDRESS_USER, DETAIL, USER};
use crate::objects::{Object, ObjectClass};

pub static SUBADDRESS: ExtensionDef = ExtensionDef {
    name: "subaddress",
    validator_load: load,
    objects: subaddress_objects,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_address_part(Some(ext), &USER);
    v.register_address_part(Some(ext), &DETAIL);
    true
}

fn subaddress_objects(class: ObjectClass, code: u8) -> Option<Object> {
    match (class, code) {
        (ObjectClass::AddressPart, ADDRESS_USER) => Some(Object::AddressPart(&USER)),
        (ObjectClass::AddressPart, ADDRESS_DETAIL) => Some(Object::AddressPart(&DETAIL)),
        _ => None,
    }
}
