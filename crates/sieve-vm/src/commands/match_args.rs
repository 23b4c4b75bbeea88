//! Matching arguments
//!
//! `:comparator`, the match type tags and the address part tags are shared
//! by every test that compares strings. A persistent tag checks the chosen
//! comparator against the match type and validates literal keys once the
//! whole command is known.

use crate::compiler::grammar::{TagCall, TagDef, TagKind};
use crate::compiler::tree::{ArgValue, ValidatedCommand};
use crate::compiler::validator::{MatchTypeReg, Validator};
use crate::extension::ExtId;
use crate::objects::{
    self, address_part, Comparator, MatchType, ObjRef, Object,
    ObjectClass, MATCH_CONTAINS, MATCH_IS, MATCH_MATCHES,
};
use crate::opcode::{OPT_ADDRESS_PART, OPT_COMPARATOR, OPT_MATCH_TYPE};

pub static COMPARATOR_TAG: TagDef = TagDef {
    kind: TagKind::Normal("comparator"),
    allow_multiple: false,
    validate: Some(validate_comparator_tag),
    validate_persistent: None,
};

pub static MATCH_TYPE_TAG: TagDef = TagDef {
    kind: TagKind::Instanced(is_match_type),
    allow_multiple: false,
    validate: Some(validate_match_type_tag),
    validate_persistent: None,
};

pub static ADDRESS_PART_TAG: TagDef = TagDef {
    kind: TagKind::Instanced(is_address_part),
    allow_multiple: false,
    validate: Some(validate_address_part_tag),
    validate_persistent: None,
};

/// Checks comparator and match type compatibility for the whole command
pub static MATCH_CHECK: TagDef = TagDef {
    kind: TagKind::Persistent,
    allow_multiple: false,
    validate: None,
    validate_persistent: Some(check_match),
};

/// Register the matching tags on `command`
pub fn register_match_tags(v: &mut Validator<'_>, command: &str, ext: Option<ExtId>, address: bool) {
    v.register_tag(command, ext, &COMPARATOR_TAG, OPT_COMPARATOR);
    v.register_tag(command, ext, &MATCH_TYPE_TAG, OPT_MATCH_TYPE);
    if address {
        v.register_tag(command, ext, &ADDRESS_PART_TAG, OPT_ADDRESS_PART);
    }
    v.register_tag(command, ext, &MATCH_CHECK, 0);
}

pub(crate) fn register_core_objects(v: &mut Validator<'_>) {
    for (identifier, code) in [
        ("is", MATCH_IS),
        ("contains", MATCH_CONTAINS),
        ("matches", MATCH_MATCHES),
    ] {
        v.register_match_type(MatchTypeReg {
            identifier,
            ext: None,
            code,
            resolve: None,
        });
    }
    v.register_address_part(None, &address_part::ALL);
    v.register_address_part(None, &address_part::LOCALPART);
    v.register_address_part(None, &address_part::DOMAIN);
}

fn validate_comparator_tag(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> bool {
    let Some(name) = v.tag_string_argument(call, "comparator name") else {
        return false;
    };
    let Some(reg) = v.comparator(&name) else {
        v.error(call.line, format!("unknown comparator '{}'", name));
        return false;
    };
    call.value = ArgValue::Object(
        ObjectClass::Comparator,
        ObjRef {
            ext: reg.ext,
            code: reg.comparator.code(),
        },
    );
    true
}

fn is_match_type(v: &Validator<'_>, identifier: &str) -> Option<usize> {
    v.match_type_index(identifier)
}

fn validate_match_type_tag(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> bool {
    let Some(reg) = call.instance.and_then(|i| v.match_type(i)) else {
        v.error(call.line, format!("unknown match type ':{}'", call.identifier));
        return false;
    };
    let code = match reg.resolve {
        Some(resolve) => match resolve(v, call) {
            Some(code) => code,
            None => return false,
        },
        None => reg.code,
    };
    call.value = ArgValue::Object(ObjectClass::MatchType, ObjRef { ext: reg.ext, code });
    true
}

fn is_address_part(v: &Validator<'_>, identifier: &str) -> Option<usize> {
    v.address_part_index(identifier)
}

fn validate_address_part_tag(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> bool {
    let Some(reg) = call.instance.and_then(|i| v.address_part(i)) else {
        v.error(call.line, format!("unknown address part ':{}'", call.identifier));
        return false;
    };
    call.value = ArgValue::Object(
        ObjectClass::AddressPart,
        ObjRef {
            ext: reg.ext,
            code: reg.part.code(),
        },
    );
    true
}

/// Comparator selected by a validated command
pub fn command_comparator(v: &Validator<'_>, cmd: &ValidatedCommand) -> &'static dyn Comparator {
    match cmd
        .object(ObjectClass::Comparator)
        .and_then(|obj| v.registry().object(ObjectClass::Comparator, obj))
    {
        Some(Object::Comparator(c)) => c,
        _ => objects::default_comparator(),
    }
}

/// Match type selected by a validated command
pub fn command_match_type(v: &Validator<'_>, cmd: &ValidatedCommand) -> &'static dyn MatchType {
    match cmd
        .object(ObjectClass::MatchType)
        .and_then(|obj| v.registry().object(ObjectClass::MatchType, obj))
    {
        Some(Object::MatchType(m)) => m,
        _ => objects::default_match_type(),
    }
}

fn check_match(v: &mut Validator<'_>, cmd: &mut ValidatedCommand) -> bool {
    let comparator = command_comparator(v, cmd);
    let match_type = command_match_type(v, cmd);

    if let Err(msg) = match_type.check_comparator(comparator) {
        v.error(cmd.line, msg);
        return false;
    }

    let keys = cmd
        .operands
        .iter()
        .rev()
        .find(|o| matches!(o, ArgValue::StringList(_)));
    let Some(keys) = keys else {
        return true;
    };

    let mut ok = true;
    let errors: Vec<String> = keys
        .literals()
        .into_iter()
        .filter_map(|key| match_type.validate_key(key, comparator).err())
        .collect();
    for msg in errors {
        v.error(cmd.line, msg);
        ok = false;
    }
    ok
}
