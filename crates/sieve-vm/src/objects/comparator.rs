//! Comparators
//!
//! A comparator defines equality, ordering and substring matching for
//! strings. Positions passed to [`Comparator::char_match`] and
//! [`Comparator::char_skip`] are byte offsets that always sit on character
//! boundaries.
//!
//! A comparator that defines equality on transformed text (case mapping,
//! decomposition) exposes the transformation through [`Comparator::fold`].
//! Substring and wildcard matching then run over the folded value and key,
//! so `:is`, `:contains` and `:matches` agree on what is equal.

use std::cmp::Ordering;
use std::ops::BitOr;
use unicode_normalization::UnicodeNormalization;

/// Operations a comparator supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComparatorFlags(u8);

impl ComparatorFlags {
    pub const EQUALITY: Self = Self(0x01);
    pub const ORDERING: Self = Self(0x02);
    pub const SUBSTRING: Self = Self(0x04);
    pub const PREFIX: Self = Self(0x08);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ComparatorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

pub trait Comparator: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Code within the owning extension (or the core table)
    fn code(&self) -> u8;

    fn flags(&self) -> ComparatorFlags;

    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Text that substring and wildcard matching run over
    ///
    /// `None` means the text is matched as is.
    fn fold(&self, _text: &str) -> Option<FoldedText> {
        None
    }

    /// Match `key[*kpos..kend]` against `val` starting at `*vpos`
    ///
    /// On success both cursors are advanced past the matched text; on
    /// failure they are left untouched.
    fn char_match(
        &self,
        _val: &str,
        _vpos: &mut usize,
        _key: &str,
        _kpos: &mut usize,
        _kend: usize,
    ) -> bool {
        false
    }

    /// Advance `pos` by one logical unit; false at the end of `val`
    fn char_skip(&self, val: &str, pos: &mut usize) -> bool {
        match val.get(*pos..).and_then(|rest| rest.chars().next()) {
            Some(c) => {
                *pos += c.len_utf8();
                true
            }
            None => false,
        }
    }

    /// Whether letters compare case-insensitively
    fn case_insensitive(&self) -> bool {
        false
    }
}

/// Folded text with a map back to the text it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedText {
    text: String,
    /// (folded offset, source offset) at every source character boundary,
    /// ending with both lengths
    bounds: Vec<(usize, usize)>,
}

impl FoldedText {
    /// Fold `source` one character at a time
    pub fn build(source: &str, fold: impl Fn(char, &mut String)) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut bounds = Vec::with_capacity(source.len() + 1);
        for (offset, c) in source.char_indices() {
            bounds.push((text.len(), offset));
            fold(c, &mut text);
        }
        bounds.push((text.len(), source.len()));
        Self { text, bounds }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Source byte range covering the folded range `start..end`
    ///
    /// A boundary inside the fold of one source character widens the range
    /// to the whole character.
    pub fn source_range(&self, start: usize, end: usize) -> (usize, usize) {
        let last = self.bounds.len() - 1;
        let from = match self.bounds.binary_search_by_key(&start, |b| b.0) {
            Ok(i) => self.bounds[i].1,
            Err(i) => self.bounds[i.saturating_sub(1)].1,
        };
        let to = match self.bounds.binary_search_by_key(&end, |b| b.0) {
            Ok(i) => self.bounds[i].1,
            Err(i) => self.bounds[i.min(last)].1,
        };
        (from, to.max(from))
    }
}

/// Substring search driven by [`Comparator::char_match`]
///
/// Runs over the folded texts when the comparator folds.
pub fn contains(cmp: &dyn Comparator, haystack: &str, needle: &str) -> bool {
    match (cmp.fold(haystack), cmp.fold(needle)) {
        (Some(haystack), Some(needle)) => find(cmp, haystack.as_str(), needle.as_str()),
        _ => find(cmp, haystack, needle),
    }
}

fn find(cmp: &dyn Comparator, haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let mut start = 0;
    loop {
        let mut vpos = start;
        let mut kpos = 0;
        if cmp.char_match(haystack, &mut vpos, needle, &mut kpos, needle.len()) {
            return true;
        }
        if !cmp.char_skip(haystack, &mut start) {
            return false;
        }
    }
}

fn match_bytes(
    val: &str,
    vpos: &mut usize,
    key: &str,
    kpos: &mut usize,
    kend: usize,
    eq: impl Fn(u8, u8) -> bool,
) -> bool {
    let (Some(v), Some(k)) = (val.as_bytes().get(*vpos..), key.as_bytes().get(*kpos..kend)) else {
        return false;
    };
    if v.len() < k.len() || !v.iter().zip(k).all(|(a, b)| eq(*a, *b)) {
        return false;
    }
    *vpos += k.len();
    *kpos = kend;
    true
}

// ===== i;octet =====

#[derive(Debug)]
pub struct OctetComparator;

pub static OCTET: OctetComparator = OctetComparator;

impl Comparator for OctetComparator {
    fn identifier(&self) -> &'static str {
        "i;octet"
    }

    fn code(&self) -> u8 {
        super::COMPARATOR_OCTET
    }

    fn flags(&self) -> ComparatorFlags {
        ComparatorFlags::EQUALITY
            | ComparatorFlags::ORDERING
            | ComparatorFlags::SUBSTRING
            | ComparatorFlags::PREFIX
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }

    fn char_match(&self, val: &str, vpos: &mut usize, key: &str, kpos: &mut usize, kend: usize) -> bool {
        match_bytes(val, vpos, key, kpos, kend, |a, b| a == b)
    }
}

// ===== i;ascii-casemap =====

#[derive(Debug)]
pub struct AsciiCasemapComparator;

pub static ASCII_CASEMAP: AsciiCasemapComparator = AsciiCasemapComparator;

impl Comparator for AsciiCasemapComparator {
    fn identifier(&self) -> &'static str {
        "i;ascii-casemap"
    }

    fn code(&self) -> u8 {
        super::COMPARATOR_ASCII_CASEMAP
    }

    fn flags(&self) -> ComparatorFlags {
        ComparatorFlags::EQUALITY
            | ComparatorFlags::ORDERING
            | ComparatorFlags::SUBSTRING
            | ComparatorFlags::PREFIX
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        let a = a.bytes().map(|c| c.to_ascii_lowercase());
        let b = b.bytes().map(|c| c.to_ascii_lowercase());
        a.cmp(b)
    }

    fn char_match(&self, val: &str, vpos: &mut usize, key: &str, kpos: &mut usize, kend: usize) -> bool {
        match_bytes(val, vpos, key, kpos, kend, |a, b| a.eq_ignore_ascii_case(&b))
    }

    fn case_insensitive(&self) -> bool {
        true
    }
}

// ===== i;ascii-numeric =====

#[derive(Debug)]
pub struct AsciiNumericComparator;

pub static ASCII_NUMERIC: AsciiNumericComparator = AsciiNumericComparator;

impl Comparator for AsciiNumericComparator {
    fn identifier(&self) -> &'static str {
        "i;ascii-numeric"
    }

    fn code(&self) -> u8 {
        0
    }

    fn flags(&self) -> ComparatorFlags {
        ComparatorFlags::EQUALITY | ComparatorFlags::ORDERING
    }

    /// Strings without a leading digit are positive infinity. Digit runs
    /// are not normalized: a longer run is greater, equal-length runs
    /// compare digit by digit, and equal runs fall back to comparing the
    /// remaining bytes.
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();
        let (da, db) = (digits(a), digits(b));

        match (da, db) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Greater,
            (_, 0) => Ordering::Less,
            _ => da
                .cmp(&db)
                .then_with(|| a.as_bytes()[..da].cmp(&b.as_bytes()[..db]))
                .then_with(|| a.as_bytes()[da..].cmp(&b.as_bytes()[db..])),
        }
    }
}

// ===== i;unicode-casemap =====

#[derive(Debug)]
pub struct UnicodeCasemapComparator;

pub static UNICODE_CASEMAP: UnicodeCasemapComparator = UnicodeCasemapComparator;

fn fold_char(c: char, out: &mut String) {
    out.extend(c.to_uppercase().nfkd());
}

/// Case-map and decompose a string, character by character
pub fn unicode_fold(s: &str) -> String {
    FoldedText::build(s, fold_char).into_string()
}

impl Comparator for UnicodeCasemapComparator {
    fn identifier(&self) -> &'static str {
        "i;unicode-casemap"
    }

    fn code(&self) -> u8 {
        0
    }

    fn flags(&self) -> ComparatorFlags {
        ComparatorFlags::EQUALITY
            | ComparatorFlags::ORDERING
            | ComparatorFlags::SUBSTRING
            | ComparatorFlags::PREFIX
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        unicode_fold(a).cmp(&unicode_fold(b))
    }

    fn fold(&self, text: &str) -> Option<FoldedText> {
        Some(FoldedText::build(text, fold_char))
    }

    /// Both sides are already folded
    fn char_match(&self, val: &str, vpos: &mut usize, key: &str, kpos: &mut usize, kend: usize) -> bool {
        match_bytes(val, vpos, key, kpos, kend, |a, b| a == b)
    }

    fn case_insensitive(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octet_is_case_sensitive() {
        assert_eq!(OCTET.compare("ABC", "abc"), Ordering::Less);
        assert_eq!(OCTET.compare("abc", "abc"), Ordering::Equal);
        assert!(!contains(&OCTET, "Hello World", "lo wo"));
        assert!(contains(&OCTET, "Hello World", "lo Wo"));
    }

    #[test]
    fn test_ascii_casemap() {
        assert_eq!(ASCII_CASEMAP.compare("ABC", "abc"), Ordering::Equal);
        assert!(contains(&ASCII_CASEMAP, "Hello World", "lo wo"));
        assert!(!contains(&ASCII_CASEMAP, "Hello World", "xyz"));
        assert!(contains(&ASCII_CASEMAP, "anything", ""));
    }

    #[test]
    fn test_char_match_cursors() {
        let mut vpos = 1;
        let mut kpos = 0;
        assert!(ASCII_CASEMAP.char_match("xABCy", &mut vpos, "abc", &mut kpos, 3));
        assert_eq!((vpos, kpos), (4, 3));

        let mut vpos = 1;
        let mut kpos = 0;
        assert!(!ASCII_CASEMAP.char_match("xABDy", &mut vpos, "abc", &mut kpos, 3));
        assert_eq!((vpos, kpos), (1, 0));
    }

    #[test]
    fn test_ascii_numeric_rules() {
        assert_eq!(ASCII_NUMERIC.compare("010", "9"), Ordering::Greater);
        assert_eq!(ASCII_NUMERIC.compare("010", "10"), Ordering::Greater);
        assert_eq!(ASCII_NUMERIC.compare("42", "42"), Ordering::Equal);
        assert_eq!(ASCII_NUMERIC.compare("42abc", "42abd"), Ordering::Less);
        assert_eq!(ASCII_NUMERIC.compare("abc", "999"), Ordering::Greater);
        assert_eq!(ASCII_NUMERIC.compare("abc", "xyz"), Ordering::Equal);
        assert!(!ASCII_NUMERIC.flags().contains(ComparatorFlags::SUBSTRING));
    }

    #[test]
    fn test_unicode_casemap() {
        assert_eq!(UNICODE_CASEMAP.compare("straße", "STRASSE"), Ordering::Equal);
        assert_eq!(UNICODE_CASEMAP.compare("Émile", "émile"), Ordering::Equal);
        assert!(contains(&UNICODE_CASEMAP, "Grüße aus Köln", "KÖLN"));
        assert!(!contains(&UNICODE_CASEMAP, "Grüße aus Köln", "Bonn"));
    }

    #[test]
    fn test_unicode_casemap_length_changing_folds() {
        assert!(contains(&UNICODE_CASEMAP, "straße", "STRASSE"));
        assert!(contains(&UNICODE_CASEMAP, "Straßenbahn", "strass"));
        assert!(contains(&UNICODE_CASEMAP, "ﬁle server", "FILE"));
        assert_eq!(UNICODE_CASEMAP.compare("ﬁle", "FILE"), Ordering::Equal);
    }

    #[test]
    fn test_folded_source_range() {
        let folded = UNICODE_CASEMAP.fold("aßb").unwrap();
        assert_eq!(folded.as_str(), "ASSB");
        // "SS" maps back to the two bytes of ß
        assert_eq!(folded.source_range(1, 3), (1, 3));
        // half of the fold widens to the whole character
        assert_eq!(folded.source_range(2, 3), (1, 3));
        assert_eq!(folded.source_range(1, 2), (1, 3));
        assert_eq!(folded.source_range(0, 4), (0, 4));
        assert_eq!(folded.source_range(4, 4), (4, 4));
    }

    #[test]
    fn test_char_skip_multibyte() {
        let mut pos = 0;
        assert!(OCTET.char_skip("éa", &mut pos));
        assert_eq!(pos, 2);
        assert!(OCTET.char_skip("éa", &mut pos));
        assert!(!OCTET.char_skip("éa", &mut pos));
    }
}
