//! `:value` and `:count`
//!
//! Both match types take the relation as a tag parameter. The relation is
//! folded into the object code, see [`relational_code`].

use crate::compiler::grammar::TagCall;
use crate::compiler::validator::{MatchTypeReg, Validator};
use crate::extension::{ExtId, ExtensionDef};
use crate::objects::relational::{relational_code, relational_match, Relation};
use crate::objects::{Object, ObjectClass};

pub static RELATIONAL: ExtensionDef = ExtensionDef {
    name: "relational",
    validator_load: load,
    objects: relational_objects,
    ..ExtensionDef::EMPTY
};

fn load(v: &mut Validator<'_>, ext: ExtId) -> bool {
    v.register_match_type(MatchTypeReg {
        identifier: "value",
        ext: Some(ext),
        code: relational_code(false, Relation::Eq),
        resolve: Some(resolve_value),
    });
    v.register_match_type(MatchTypeReg {
        identifier: "count",
        ext: Some(ext),
        code: relational_code(true, Relation::Eq),
        resolve: Some(resolve_count),
    });
    true
}

fn resolve_value(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> Option<u8> {
    resolve(v, call, false)
}

fn resolve_count(v: &mut Validator<'_>, call: &mut TagCall<'_>) -> Option<u8> {
    resolve(v, call, true)
}

fn resolve(v: &mut Validator<'_>, call: &mut TagCall<'_>, count: bool) -> Option<u8> {
    let name = v.tag_string_argument(call, "relation")?;
    match Relation::from_name(&name) {
        Some(relation) => Some(relational_code(count, relation)),
        None => {
            v.error(
                call.line,
                format!(
                    "invalid relation '{}' for the :{} match type; expected one of gt, ge, lt, le, eq or ne",
                    name, call.identifier
                ),
            );
            None
        }
    }
}

fn relational_objects(class: ObjectClass, code: u8) -> Option<Object> {
    if class != ObjectClass::MatchType {
        return None;
    }
    relational_match(code).map(|m| Object::MatchType(m))
}
