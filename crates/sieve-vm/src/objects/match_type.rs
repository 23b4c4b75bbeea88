//! Match types and match values

use super::comparator::{self, Comparator, ComparatorFlags};
use super::glob;
use super::regex::CompiledKey;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// A comparison that could not be carried out; treated as no match
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("match exceeded {0} iterations")]
    IterationLimit(usize),

    #[error("invalid regular expression: {0}")]
    Regex(String),
}

/// Values captured by the last successful `:matches` or `:regex` test
///
/// `${0}` is the whole matched value, `${1}` onwards the captured parts.
/// Captures only replace the previous set when a match succeeds.
#[derive(Debug, Clone, Default)]
pub struct MatchValues {
    enabled: bool,
    values: Vec<String>,
}

impl MatchValues {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            values: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switch capturing on or off, returning the previous setting
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.enabled, enabled)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the captured values; ignored while disabled
    pub fn commit(&mut self, values: Vec<String>) {
        if self.enabled {
            self.values = values;
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// State of one match evaluation
#[derive(Clone)]
pub struct MatchContext {
    pub comparator: &'static dyn Comparator,
    /// Backtracking budget for a single value/key comparison
    pub max_iterations: usize,
    capture: bool,
    staged: Option<Vec<String>>,
    regexes: HashMap<(String, bool), CompiledKey>,
}

impl MatchContext {
    pub fn new(comparator: &'static dyn Comparator, max_iterations: usize, capture: bool) -> Self {
        Self {
            comparator,
            max_iterations,
            capture,
            staged: None,
            regexes: HashMap::new(),
        }
    }

    /// Whether match types should record captures
    pub fn capturing(&self) -> bool {
        self.capture
    }

    /// Record captures of the comparison that just succeeded
    pub fn stage(&mut self, values: Vec<String>) {
        if self.capture {
            self.staged = Some(values);
        }
    }

    pub fn take_staged(&mut self) -> Option<Vec<String>> {
        self.staged.take()
    }

    /// Compiled form of a `:regex` key, reused for every value of this match
    pub fn compiled_regex(&mut self, key: &str) -> Result<CompiledKey, MatchError> {
        let cache_key = (key.to_string(), self.comparator.case_insensitive());
        if let Some(compiled) = self.regexes.get(&cache_key) {
            return Ok(compiled.clone());
        }
        let compiled = CompiledKey::new(key, cache_key.1)?;
        self.regexes.insert(cache_key, compiled.clone());
        Ok(compiled)
    }

    pub fn compiled_regex_count(&self) -> usize {
        self.regexes.len()
    }
}

pub trait MatchType: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Code within the owning extension (or the core table)
    fn code(&self) -> u8;

    /// Name including parameters, for dumps and traces
    fn describe(&self) -> String {
        format!(":{}", self.identifier())
    }

    /// Comparator operations this match type relies on
    fn needs(&self) -> ComparatorFlags {
        ComparatorFlags::EQUALITY
    }

    /// Whether `cmp` can be combined with this match type
    fn check_comparator(&self, cmp: &dyn Comparator) -> Result<(), String> {
        if cmp.flags().contains(self.needs()) {
            Ok(())
        } else {
            Err(format!(
                "the comparator `{}` cannot be used with the :{} match type",
                cmp.identifier(),
                self.identifier()
            ))
        }
    }

    /// Static check of a literal key
    fn validate_key(&self, _key: &str, _cmp: &dyn Comparator) -> Result<(), String> {
        Ok(())
    }

    /// Whether keys are matched against the number of values
    fn is_count(&self) -> bool {
        false
    }

    fn match_key(&self, ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError>;

    fn match_count(&self, _ctx: &mut MatchContext, _count: usize, _key: &str) -> bool {
        false
    }
}

// ===== :is =====

#[derive(Debug)]
pub struct IsMatch;

pub static IS: IsMatch = IsMatch;

impl MatchType for IsMatch {
    fn identifier(&self) -> &'static str {
        "is"
    }

    fn code(&self) -> u8 {
        super::MATCH_IS
    }

    fn match_key(&self, ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError> {
        Ok(ctx.comparator.compare(value, key) == Ordering::Equal)
    }
}

// ===== :contains =====

#[derive(Debug)]
pub struct ContainsMatch;

pub static CONTAINS: ContainsMatch = ContainsMatch;

impl MatchType for ContainsMatch {
    fn identifier(&self) -> &'static str {
        "contains"
    }

    fn code(&self) -> u8 {
        super::MATCH_CONTAINS
    }

    fn needs(&self) -> ComparatorFlags {
        ComparatorFlags::SUBSTRING
    }

    fn match_key(&self, ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError> {
        Ok(comparator::contains(ctx.comparator, value, key))
    }
}

// ===== :matches =====

#[derive(Debug)]
pub struct MatchesMatch;

pub static MATCHES: MatchesMatch = MatchesMatch;

impl MatchType for MatchesMatch {
    fn identifier(&self) -> &'static str {
        "matches"
    }

    fn code(&self) -> u8 {
        super::MATCH_MATCHES
    }

    fn needs(&self) -> ComparatorFlags {
        ComparatorFlags::SUBSTRING
    }

    fn match_key(&self, ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError> {
        glob::matches(ctx, value, key)
    }
}
