//! `:value` and `:count` match types
//!
//! The object code packs both the base and the relation:
//! `base << 3 | relation`, with base 0 for `:value` and 1 for `:count`.

use super::comparator::ComparatorFlags;
use super::match_type::{MatchContext, MatchError, MatchType};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Relation {
    Gt = 0,
    Ge = 1,
    Lt = 2,
    Le = 3,
    Eq = 4,
    Ne = 5,
}

impl Relation {
    pub const ALL: [Relation; 6] = [
        Relation::Gt,
        Relation::Ge,
        Relation::Lt,
        Relation::Le,
        Relation::Eq,
        Relation::Ne,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Relation::Gt => "gt",
            Relation::Ge => "ge",
            Relation::Lt => "lt",
            Relation::Le => "le",
            Relation::Eq => "eq",
            Relation::Ne => "ne",
        }
    }

    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            Relation::Gt => ord == Ordering::Greater,
            Relation::Ge => ord != Ordering::Less,
            Relation::Lt => ord == Ordering::Less,
            Relation::Le => ord != Ordering::Greater,
            Relation::Eq => ord == Ordering::Equal,
            Relation::Ne => ord != Ordering::Equal,
        }
    }
}

#[derive(Debug)]
pub struct RelationalMatch {
    count: bool,
    relation: Relation,
}

const fn relational(count: bool, relation: Relation) -> RelationalMatch {
    RelationalMatch { count, relation }
}

static VALUE_MATCHES: [RelationalMatch; 6] = [
    relational(false, Relation::Gt),
    relational(false, Relation::Ge),
    relational(false, Relation::Lt),
    relational(false, Relation::Le),
    relational(false, Relation::Eq),
    relational(false, Relation::Ne),
];

static COUNT_MATCHES: [RelationalMatch; 6] = [
    relational(true, Relation::Gt),
    relational(true, Relation::Ge),
    relational(true, Relation::Lt),
    relational(true, Relation::Le),
    relational(true, Relation::Eq),
    relational(true, Relation::Ne),
];

/// Object code for a base and relation
pub fn relational_code(count: bool, relation: Relation) -> u8 {
    (u8::from(count) << 3) | relation as u8
}

/// Look up the match type for an object code
pub fn relational_match(code: u8) -> Option<&'static RelationalMatch> {
    let relation = code & 0x07;
    match code >> 3 {
        0 => VALUE_MATCHES.get(relation as usize),
        1 => COUNT_MATCHES.get(relation as usize),
        _ => None,
    }
}

impl RelationalMatch {
    pub fn relation(&self) -> Relation {
        self.relation
    }
}

impl MatchType for RelationalMatch {
    fn identifier(&self) -> &'static str {
        if self.count {
            "count"
        } else {
            "value"
        }
    }

    fn code(&self) -> u8 {
        relational_code(self.count, self.relation)
    }

    fn describe(&self) -> String {
        format!(":{} \"{}\"", self.identifier(), self.relation.name())
    }

    fn needs(&self) -> ComparatorFlags {
        ComparatorFlags::ORDERING
    }

    fn is_count(&self) -> bool {
        self.count
    }

    fn match_key(&self, ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError> {
        Ok(self.relation.holds(ctx.comparator.compare(value, key)))
    }

    fn match_count(&self, ctx: &mut MatchContext, count: usize, key: &str) -> bool {
        self.relation
            .holds(ctx.comparator.compare(&count.to_string(), key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::comparator::{ASCII_CASEMAP, ASCII_NUMERIC};

    #[test]
    fn test_codes() {
        assert_eq!(relational_code(false, Relation::Gt), 0);
        assert_eq!(relational_code(true, Relation::Ge), 9);
        let m = relational_match(9).unwrap();
        assert!(m.is_count());
        assert_eq!(m.relation(), Relation::Ge);
        assert!(relational_match(6).is_none());
        assert!(relational_match(16).is_none());
        assert_eq!(Relation::from_name("NE"), Some(Relation::Ne));
        assert_eq!(Relation::from_name("gte"), None);
    }

    #[test]
    fn test_count_ge() {
        let m = relational_match(relational_code(true, Relation::Ge)).unwrap();
        let mut ctx = MatchContext::new(&ASCII_NUMERIC, 100, false);
        assert!(m.match_count(&mut ctx, 2, "2"));
        assert!(!m.match_count(&mut ctx, 1, "2"));
    }

    #[test]
    fn test_value_relations() {
        let lt = relational_match(relational_code(false, Relation::Lt)).unwrap();
        let mut ctx = MatchContext::new(&ASCII_NUMERIC, 100, false);
        assert!(lt.match_key(&mut ctx, "9", "10").unwrap());

        let mut ctx = MatchContext::new(&ASCII_CASEMAP, 100, false);
        assert!(!lt.match_key(&mut ctx, "9", "10").unwrap());
        assert_eq!(lt.describe(), ":value \"lt\"");
    }
}
