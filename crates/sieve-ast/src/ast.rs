//! Syntax tree node definitions

use std::fmt;

/// Value of a single argument as written in the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    /// Number literal, quantifier already applied
    Number(u64),
    /// Single string (quoted or multi-line)
    String(String),
    /// Bracketed string list
    StringList(Vec<String>),
    /// Tagged argument, stored without the leading colon
    Tag(String),
}

impl ArgumentValue {
    /// Name of the argument type, as used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgumentValue::Number(_) => "number",
            ArgumentValue::String(_) => "string",
            ArgumentValue::StringList(_) => "string list",
            ArgumentValue::Tag(_) => "tag",
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Number(n) => write!(f, "{}", n),
            ArgumentValue::String(s) => write!(f, "\"{}\"", s),
            ArgumentValue::StringList(list) => {
                write!(f, "[")?;
                for (i, s) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\"", s)?;
                }
                write!(f, "]")
            }
            ArgumentValue::Tag(t) => write!(f, ":{}", t),
        }
    }
}

/// An argument together with its source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub value: ArgumentValue,
    pub line: u32,
}

impl Argument {
    pub fn new(value: ArgumentValue, line: u32) -> Self {
        Self { value, line }
    }

    /// Tag identifier if this argument is a tag
    pub fn as_tag(&self) -> Option<&str> {
        match &self.value {
            ArgumentValue::Tag(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.value, ArgumentValue::Tag(_))
    }
}

/// Sub-tests attached to a command or test
///
/// The parser distinguishes a single test (`not exists "x"`) from a
/// parenthesized test list (`anyof (true)`), even when the list holds a
/// single element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tests {
    #[default]
    None,
    Single(Box<Test>),
    List(Vec<Test>),
}

impl Tests {
    /// Iterate over all contained tests regardless of shape
    pub fn iter(&self) -> std::slice::Iter<'_, Test> {
        match self {
            Tests::None => <&[Test]>::default().iter(),
            Tests::Single(t) => std::slice::from_ref(t.as_ref()).iter(),
            Tests::List(list) => list.iter(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Tests::None => 0,
            Tests::Single(_) => 1,
            Tests::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Test node (`header :is "subject" "x"`, `anyof (...)`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    pub identifier: String,
    pub arguments: Vec<Argument>,
    pub tests: Tests,
    pub line: u32,
}

/// Command node (`keep;`, `if ... { ... }`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub identifier: String,
    pub arguments: Vec<Argument>,
    pub tests: Tests,
    pub block: Option<Vec<Command>>,
    pub line: u32,
}

/// A complete parsed script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Script name (used in diagnostics and stored in compiled binaries)
    pub name: String,
    pub commands: Vec<Command>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    /// Append a command (builder style)
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Append several commands (builder style)
    pub fn commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_display() {
        assert_eq!(ArgumentValue::Number(5).to_string(), "5");
        assert_eq!(ArgumentValue::Tag("is".into()).to_string(), ":is");
        assert_eq!(
            ArgumentValue::StringList(vec!["a".into(), "b".into()]).to_string(),
            "[\"a\", \"b\"]"
        );
    }

    #[test]
    fn test_tests_shapes() {
        let t = Test {
            identifier: "true".into(),
            arguments: vec![],
            tests: Tests::None,
            line: 1,
        };

        assert_eq!(Tests::None.len(), 0);
        assert_eq!(Tests::Single(Box::new(t.clone())).len(), 1);
        assert_eq!(Tests::List(vec![t.clone(), t]).iter().count(), 2);
    }
}
