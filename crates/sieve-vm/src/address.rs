//! RFC 2822 address parsing
//!
//! Only what the address tests need: mailbox lists with groups, display
//! names, comments, quoted local parts, source routes and domain literals.
//! Values that do not parse are handed back as `None`; callers then match
//! the raw value under `:all` only.

use std::fmt;

/// A parsed mailbox address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Local part with quoting removed
    pub local_part: String,
    /// Domain, absent for bare local parts accepted in envelopes
    pub domain: Option<String>,
}

impl Address {
    pub fn new(local_part: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            local_part: local_part.into(),
            domain: domain.map(str::to_string),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}@{}", self.local_part, domain),
            None => write!(f, "{}", self.local_part),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(String),
    Quoted(String),
    DomainLiteral(String),
    Special(char),
}

const SPECIALS: &str = "<>@,;:.";

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                let mut depth = 0usize;
                loop {
                    match chars.get(i)? {
                        '\\' => i += 1,
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i)? {
                        '\\' => {
                            i += 1;
                            text.push(*chars.get(i)?);
                        }
                        '"' => break,
                        '\r' | '\n' => {}
                        other => text.push(*other),
                    }
                    i += 1;
                }
                i += 1;
                tokens.push(Token::Quoted(text));
            }
            '[' => {
                let mut text = String::from("[");
                i += 1;
                loop {
                    match chars.get(i)? {
                        '\\' => {
                            i += 1;
                            text.push(*chars.get(i)?);
                        }
                        ']' => break,
                        '[' => return None,
                        other if !other.is_whitespace() => text.push(*other),
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
                text.push(']');
                tokens.push(Token::DomainLiteral(text));
            }
            ')' | ']' | '\\' => return None,
            c if SPECIALS.contains(c) => {
                tokens.push(Token::Special(c));
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_whitespace() || SPECIALS.contains(c) || "()[]\"\\".contains(c) {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token::Atom(chars[start..i].iter().collect()));
            }
        }
    }

    Some(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Accept addresses without a domain
    lenient: bool,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_special(&self, c: char) -> bool {
        self.peek() == Some(&Token::Special(c))
    }

    fn expect_special(&mut self, c: char) -> Option<()> {
        if self.at_special(c) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// First of `:`, `<`, `@`, `,`, `;` ahead of the cursor
    fn lookahead(&self) -> Option<char> {
        self.tokens[self.pos..].iter().find_map(|t| match t {
            Token::Special(c) if ":<@,;".contains(*c) => Some(*c),
            _ => None,
        })
    }

    fn skip_phrase(&mut self, until: char) -> Option<()> {
        while !self.at_special(until) {
            match self.peek()? {
                Token::Atom(_) | Token::Quoted(_) | Token::Special('.') => self.pos += 1,
                _ => return None,
            }
        }
        Some(())
    }

    fn address_list(&mut self, out: &mut Vec<Address>) -> Option<()> {
        loop {
            while self.at_special(',') {
                self.pos += 1;
            }
            if self.at_end() {
                return Some(());
            }
            self.address(out)?;
            if !self.at_end() {
                self.expect_special(',')?;
            }
        }
    }

    fn address(&mut self, out: &mut Vec<Address>) -> Option<()> {
        if self.lookahead() == Some(':') {
            self.skip_phrase(':')?;
            self.pos += 1;
            loop {
                while self.at_special(',') {
                    self.pos += 1;
                }
                if self.at_special(';') {
                    self.pos += 1;
                    return Some(());
                }
                out.push(self.mailbox()?);
            }
        }
        out.push(self.mailbox()?);
        Some(())
    }

    fn mailbox(&mut self) -> Option<Address> {
        if self.lookahead() == Some('<') {
            self.skip_phrase('<')?;
            return self.angle_addr();
        }
        self.addr_spec()
    }

    fn angle_addr(&mut self) -> Option<Address> {
        self.expect_special('<')?;
        if self.at_special('@') {
            // Obsolete source route: @a,@b:
            while !self.at_special(':') {
                self.peek()?;
                self.pos += 1;
            }
            self.pos += 1;
        }
        let addr = self.addr_spec()?;
        self.expect_special('>')?;
        Some(addr)
    }

    fn word(&mut self) -> Option<String> {
        match self.peek()? {
            Token::Atom(s) | Token::Quoted(s) => {
                let s = s.clone();
                self.pos += 1;
                Some(s)
            }
            _ => None,
        }
    }

    fn addr_spec(&mut self) -> Option<Address> {
        let mut local = self.word()?;
        while self.at_special('.') {
            self.pos += 1;
            local.push('.');
            local.push_str(&self.word()?);
        }

        if !self.at_special('@') {
            return if self.lenient {
                Some(Address::new(local, None))
            } else {
                None
            };
        }
        self.pos += 1;

        let domain = match self.peek()? {
            Token::DomainLiteral(lit) => {
                let lit = lit.clone();
                self.pos += 1;
                lit
            }
            Token::Atom(_) => {
                let mut domain = self.word()?;
                while self.at_special('.') {
                    self.pos += 1;
                    match self.peek()? {
                        Token::Atom(s) => {
                            domain.push('.');
                            domain.push_str(s);
                            self.pos += 1;
                        }
                        _ => return None,
                    }
                }
                domain
            }
            _ => return None,
        };

        Some(Address::new(local, Some(&domain)))
    }
}

/// Parse a header value holding an address list
///
/// Returns `None` when the value is not a valid list. An empty group
/// (`undisclosed-recipients:;`) yields an empty list.
pub fn parse_address_list(value: &str) -> Option<Vec<Address>> {
    let mut parser = Parser {
        tokens: tokenize(value)?,
        pos: 0,
        lenient: false,
    };
    let mut out = Vec::new();
    parser.address_list(&mut out)?;
    Some(out)
}

/// Parse a single envelope path or redirect target
///
/// Angle brackets are optional and a missing domain is tolerated.
pub fn parse_path(value: &str) -> Option<Address> {
    let mut parser = Parser {
        tokens: tokenize(value)?,
        pos: 0,
        lenient: true,
    };
    let addr = if parser.at_special('<') {
        parser.angle_addr()?
    } else {
        parser.addr_spec()?
    };
    parser.at_end().then_some(addr)
}

/// Whether `value` is a complete `local@domain` address
pub fn is_valid_mailbox(value: &str) -> bool {
    matches!(parse_path(value), Some(Address { domain: Some(_), .. }))
}
