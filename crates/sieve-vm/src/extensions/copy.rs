//! `:copy`
//!
//! The tag is attached to `fileinto` and `redirect` as a side effect that
//! keeps the implicit keep alive.

use crate::compiler::grammar::{TagCall, TagDef, TagKind};
use crate::compiler::tree::ArgValue;
use crate::compiler::validator::Validator;
use crate::extension::{ExtId, ExtensionDef};
use crate::objects::side_effect::{COPY as COPY_EFFECT, SIDE_EFFECT_COPY};
use crate::objects::{ObjRef, Object, ObjectClass};
use crate::opcode::OPT_SIDE_EFFECT;

static COPY_TAG: TagDef = TagDef {
    kind: TagKind::Normal("copy"),
    allow_multiple: false,
    validate: Some(validate_copy_tag),
    validate_persistent: None,
};

pub static COPY: ExtensionDef = ExtensionDef {
    name: "copy",
    validator_load: load,
    objects: copy_objects,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_tag("fileinto", Some(ext), &COPY_TAG, OPT_SIDE_EFFECT);
    v.register_tag("redirect", Some(ext), &COPY_TAG, OPT_SIDE_EFFECT);
    true
}

fn validate_copy_tag(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> bool {
    let Some(ext) = v.registry().lookup(COPY.name) else {
        v.error(call.line, "the :copy tag is not available");
        return false;
    };
    call.value = ArgValue::Object(ObjectClass::SideEffect, ObjRef::ext(ext, SIDE_EFFECT_COPY));
    true
}

fn copy_objects(class: ObjectClass, code: u8) -> Option<Object> {
    (class == ObjectClass::SideEffect && code == SIDE_EFFECT_COPY)
        .then_some(Object::SideEffect(&COPY_EFFECT))
}
