//! Wildcard matching for `:matches`
//!
//! `*` matches any sequence, `?` exactly one character and `\` makes the
//! next character literal. Matching keeps a single backtrack point at the
//! most recent `*`, which is enough for glob patterns, and gives up after
//! the context's iteration budget.
//!
//! Every `*` span and every `?` character is captured in pattern order.
//! For folding comparators the pattern literals and the value are folded
//! first and captures are mapped back onto the original value.

use super::comparator::FoldedText;
use super::match_type::{MatchContext, MatchError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Star,
    Any,
    Literal(String),
}

fn tokenize(key: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = key.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' | '?' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(if c == '*' { Token::Star } else { Token::Any });
            }
            '\\' => literal.push(chars.next().unwrap_or('\\')),
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

/// Backtrack point: star token index, star start, next retry position,
/// captures recorded before the star
struct Backtrack {
    token: usize,
    start: usize,
    resume: usize,
    captures: usize,
}

pub fn matches(ctx: &mut MatchContext, value: &str, key: &str) -> Result<bool, MatchError> {
    let cmp = ctx.comparator;
    let folded = cmp.fold(value);
    let text = folded.as_ref().map_or(value, FoldedText::as_str);
    let tokens: Vec<Token> = tokenize(key)
        .into_iter()
        .map(|token| match token {
            Token::Literal(lit) => Token::Literal(cmp.fold(&lit).map_or(lit, FoldedText::into_string)),
            other => other,
        })
        .collect();
    let mut captures: Vec<(usize, usize)> = Vec::new();
    let mut backtrack: Option<Backtrack> = None;
    let mut ti = 0;
    let mut vpos = 0;
    let mut iterations = 0usize;

    loop {
        iterations += 1;
        if iterations > ctx.max_iterations {
            return Err(MatchError::IterationLimit(ctx.max_iterations));
        }

        let advanced = match tokens.get(ti) {
            None if vpos == text.len() => break,
            None => false,
            Some(Token::Star) if ti + 1 == tokens.len() => {
                captures.push((vpos, text.len()));
                vpos = text.len();
                ti += 1;
                true
            }
            Some(Token::Star) => {
                backtrack = Some(Backtrack {
                    token: ti,
                    start: vpos,
                    resume: vpos,
                    captures: captures.len(),
                });
                captures.push((vpos, vpos));
                ti += 1;
                true
            }
            Some(Token::Any) => {
                let start = vpos;
                if cmp.char_skip(text, &mut vpos) {
                    captures.push((start, vpos));
                    ti += 1;
                    true
                } else {
                    false
                }
            }
            Some(Token::Literal(lit)) => {
                let mut kpos = 0;
                if cmp.char_match(text, &mut vpos, lit, &mut kpos, lit.len()) {
                    ti += 1;
                    true
                } else {
                    false
                }
            }
        };

        if advanced {
            continue;
        }

        // Let the most recent star swallow one more character
        let Some(point) = backtrack.as_mut() else {
            return Ok(false);
        };
        if !cmp.char_skip(text, &mut point.resume) {
            return Ok(false);
        }
        captures.truncate(point.captures);
        captures.push((point.start, point.resume));
        vpos = point.resume;
        ti = point.token + 1;
    }

    if ctx.capturing() {
        let mut values = Vec::with_capacity(captures.len() + 1);
        values.push(value.to_string());
        values.extend(captures.iter().map(|&(start, end)| {
            let (start, end) = match &folded {
                Some(folded) => folded.source_range(start, end),
                None => (start, end),
            };
            value[start..end].to_string()
        }));
        ctx.stage(values);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::comparator::{ASCII_CASEMAP, OCTET, UNICODE_CASEMAP};

    fn run(value: &str, key: &str) -> (bool, Option<Vec<String>>) {
        let mut ctx = MatchContext::new(&ASCII_CASEMAP, 100_000, true);
        let matched = matches(&mut ctx, value, key).unwrap();
        (matched, ctx.take_staged())
    }

    #[test]
    fn test_tokenize_escapes() {
        assert_eq!(
            tokenize(r"a\*b*?"),
            vec![Token::Literal("a*b".into()), Token::Star, Token::Any]
        );
        assert_eq!(tokenize("x\\"), vec![Token::Literal("x\\".into())]);
    }

    #[test]
    fn test_captures() {
        let (matched, caps) = run("aXXXbYc", "a*b?c");
        assert!(matched);
        assert_eq!(caps.unwrap(), vec!["aXXXbYc", "XXX", "Y"]);

        let (matched, caps) = run("aXXXbYYc", "a*b?c");
        assert!(!matched);
        assert!(caps.is_none());
    }

    #[test]
    fn test_star_forms() {
        assert!(run("", "*").0);
        assert!(run("anything", "*").0);
        assert!(run("abc", "a**c").0);
        assert!(!run("abc", "?").0);
        assert!(run("ab", "??").0);
        assert!(run("x-spam: yes", "*spam*").0);
        assert!(!run("abc", "abcd").0);
        assert!(run("ABC", "a?c").0);
    }

    #[test]
    fn test_earlier_stars_match_shortest() {
        let (matched, caps) = run("foo.bar.baz", "*.*");
        assert!(matched);
        assert_eq!(caps.unwrap(), vec!["foo.bar.baz", "foo", "bar.baz"]);

        let (matched, caps) = run("joe@example.com.au", "*@*.*");
        assert!(matched);
        assert_eq!(caps.unwrap(), vec!["joe@example.com.au", "joe", "example", "com.au"]);
    }

    #[test]
    fn test_literal_star_and_case() {
        let mut ctx = MatchContext::new(&OCTET, 1000, false);
        assert!(matches(&mut ctx, "a*c", r"a\*c").unwrap());
        assert!(!matches(&mut ctx, "abc", r"a\*c").unwrap());
        assert!(!matches(&mut ctx, "ABC", "abc").unwrap());
    }

    #[test]
    fn test_folding_comparator_captures_original_text() {
        let mut ctx = MatchContext::new(&UNICODE_CASEMAP, 1000, true);
        assert!(matches(&mut ctx, "Große Straße 5", "grosse *").unwrap());
        assert_eq!(ctx.take_staged().unwrap(), vec!["Große Straße 5", "Straße 5"]);

        assert!(matches(&mut ctx, "straße", "STRA?SE").unwrap());
        assert!(matches(&mut ctx, "ﬁne", "FI*").unwrap());
        assert!(!matches(&mut ctx, "straße", "STRASE").unwrap());
    }

    #[test]
    fn test_iteration_cap() {
        let mut ctx = MatchContext::new(&OCTET, 10, false);
        let value = "a".repeat(200);
        assert_eq!(
            matches(&mut ctx, &value, "*b*c"),
            Err(MatchError::IterationLimit(10))
        );
    }
}
