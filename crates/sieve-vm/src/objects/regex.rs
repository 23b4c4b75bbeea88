//! `:regex` match type
//!
//! Keys are compiled with the `regex` crate. Case-insensitive comparators
//! turn on case-insensitive matching; only `i;octet` and
//! `i;ascii-casemap` are accepted.
//!
//! Match values follow POSIX leftmost-longest semantics for the overall
//! match: among the matches starting at the leftmost possible position the
//! longest one is reported. Groups are assigned within that span the way
//! the `regex` crate assigns them. Keys that inspect the text after a
//! position (`$`, `\z`, word boundaries) keep the crate's leftmost-first
//! match.

use super::comparator::{Comparator, ComparatorFlags};
use super::match_type::{MatchContext, MatchError, MatchType};
use regex::{Captures, Regex, RegexBuilder};
use std::iter;

/// Compiled program size bound for a single key
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug)]
pub struct RegexMatch;

pub static REGEX: RegexMatch = RegexMatch;

pub fn compile(key: &str, case_insensitive: bool) -> Result<Regex, MatchError> {
    RegexBuilder::new(key)
        .case_insensitive(case_insensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| MatchError::Regex(e.to_string()))
}

/// Whether a key contains an assertion about the text following a position
fn inspects_following_text(key: &str) -> bool {
    key.contains('$') || ["\\b", "\\B", "\\z", "\\<", "\\>"].iter().any(|a| key.contains(a))
}

/// A `:regex` key compiled once per match evaluation
#[derive(Debug, Clone)]
pub struct CompiledKey {
    regex: Regex,
    /// The key pinned to the end of the haystack, for the longest match
    end_anchored: Option<Regex>,
}

impl CompiledKey {
    pub fn new(key: &str, case_insensitive: bool) -> Result<Self, MatchError> {
        let regex = compile(key, case_insensitive)?;
        let end_anchored = if inspects_following_text(key) {
            None
        } else {
            compile(&format!("(?:{})\\z", key), case_insensitive).ok()
        };
        Ok(Self { regex, end_anchored })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Whole match and groups of the leftmost-longest match
    ///
    /// Groups that did not participate become empty strings so indexes
    /// stay stable.
    pub fn captures(&self, value: &str) -> Option<Vec<String>> {
        let first = self.regex.captures(value)?;
        let (start, first_end) = first.get(0).map(|m| (m.start(), m.end()))?;

        if let Some(anchored) = &self.end_anchored {
            let ends = value
                .char_indices()
                .map(|(i, _)| i)
                .chain(iter::once(value.len()))
                .filter(|&end| end > first_end);
            for end in ends.collect::<Vec<_>>().into_iter().rev() {
                let longer = anchored
                    .captures_at(&value[..end], start)
                    .filter(|caps| caps.get(0).is_some_and(|m| m.start() == start));
                if let Some(caps) = longer {
                    return Some(group_values(&caps));
                }
            }
        }
        Some(group_values(&first))
    }
}

fn group_values(caps: &Captures<'_>) -> Vec<String> {
    caps.iter()
        .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect()
}

impl MatchType for RegexMatch {
    fn identifier(&self) -> &'static str {
        "regex"
    }

    fn code(&self) -> u8 {
        0
    }

    fn needs(&self) -> ComparatorFlags {
        ComparatorFlags::SUBSTRING
    }

    fn check_comparator(&self, cmp: &dyn Comparator) -> Result<(), String> {
        match cmp.identifier() {
            "i;octet" | "i;ascii-casemap" => Ok(()),
            other => Err(format!(
                "the :regex match type only supports the i;octet and i;ascii-casemap comparators, not `{}`",
                other
            )),
        }
    }

    fn validate_key(&self, key: &str, cmp: &dyn Comparator) -> Result<(), String> {
        compile(key, cmp.case_insensitive())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn match_key(&self, ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError> {
        let compiled = ctx.compiled_regex(key)?;

        if !ctx.capturing() {
            return Ok(compiled.is_match(value));
        }

        match compiled.captures(value) {
            Some(values) => {
                ctx.stage(values);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::comparator::{ASCII_CASEMAP, OCTET, UNICODE_CASEMAP};

    #[test]
    fn test_regex_case_handling() {
        let mut ctx = MatchContext::new(&ASCII_CASEMAP, 100, false);
        assert!(REGEX.match_key(&mut ctx, "Hello World", "^hello").unwrap());

        let mut ctx = MatchContext::new(&OCTET, 100, false);
        assert!(!REGEX.match_key(&mut ctx, "Hello World", "^hello").unwrap());
    }

    #[test]
    fn test_regex_captures_keep_indexes() {
        let mut ctx = MatchContext::new(&OCTET, 100, true);
        assert!(REGEX.match_key(&mut ctx, "abc", "(x)?(b)(c)").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["bc", "", "b", "c"]);
    }

    #[test]
    fn test_regex_reports_longest_leftmost_match() {
        let mut ctx = MatchContext::new(&OCTET, 100, true);
        assert!(REGEX.match_key(&mut ctx, "ab", "(a|ab)").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["ab", "ab"]);

        assert!(REGEX.match_key(&mut ctx, "xabcd!", "x(a|ab)(c|bcd)").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["xabcd", "a", "bcd"]);

        // leftmost start wins over a longer match further right
        assert!(REGEX.match_key(&mut ctx, "a-bbbb", "a|b+").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_regex_end_assertions_keep_first_match() {
        let mut ctx = MatchContext::new(&OCTET, 100, true);
        assert!(REGEX.match_key(&mut ctx, "ab ab", "ab$").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["ab"]);

        assert!(REGEX.match_key(&mut ctx, "cat catalog", "(cat|catalog)\\b").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["cat", "cat"]);
    }

    #[test]
    fn test_keys_compiled_once_per_match() {
        let mut ctx = MatchContext::new(&ASCII_CASEMAP, 100, false);
        for value in ["alpha", "beta", "gamma"] {
            REGEX.match_key(&mut ctx, value, "^b").unwrap();
        }
        assert_eq!(ctx.compiled_regex_count(), 1);
        REGEX.match_key(&mut ctx, "beta", "a$").unwrap();
        assert_eq!(ctx.compiled_regex_count(), 2);
    }

    #[test]
    fn test_regex_comparator_restriction() {
        assert!(REGEX.check_comparator(&OCTET).is_ok());
        assert!(REGEX.check_comparator(&UNICODE_CASEMAP).is_err());
    }

    #[test]
    fn test_invalid_key() {
        assert!(REGEX.validate_key("(unclosed", &OCTET).is_err());
        let mut ctx = MatchContext::new(&OCTET, 100, false);
        assert!(matches!(
            REGEX.match_key(&mut ctx, "x", "(unclosed"),
            Err(MatchError::Regex(_))
        ));
    }
}
