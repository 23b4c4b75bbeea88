//! `:regex`

use crate::compiler::validator::{MatchTypeReg, Validator};
use crate::extension::{ExtId, ExtensionDef};
use crate::objects::regex::REGEX as REGEX_MATCH;
use crate::objects::{MatchType, Object, ObjectClass};

pub static REGEX: ExtensionDef = ExtensionDef {
    name: "regex",
    validator_load: load,
    objects: regex_objects,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_match_type(MatchTypeReg {
        identifier: "regex",
        ext: Some(ext),
        code: REGEX_MATCH.code(),
        resolve: None,
    });
    true
}

fn regex_objects(class: ObjectClass, code: u8) -> Option<Object> {
    (class == ObjectClass::MatchType && code == REGEX_MATCH.code())
        .then_some(Object::MatchType(&REGEX_MATCH))
}
