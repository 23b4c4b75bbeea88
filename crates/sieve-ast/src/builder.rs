//! Fluent constructors for syntax trees
//!
//! ```
//! use sieve_ast::{command, test};
//!
//! let rule = command("if")
//!     .test(test("header").tag("contains").string("subject").string("offer"))
//!     .block(vec![command("discard").build()])
//!     .build();
//! assert_eq!(rule.identifier, "if");
//! ```

use crate::ast::{Argument, ArgumentValue, Command, Test, Tests};

/// Start building a command
pub fn command(identifier: &str) -> NodeBuilder {
    NodeBuilder::new(identifier)
}

/// Start building a test
pub fn test(identifier: &str) -> NodeBuilder {
    NodeBuilder::new(identifier)
}

/// Shared builder for commands and tests
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    identifier: String,
    arguments: Vec<Argument>,
    tests: Tests,
    block: Option<Vec<Command>>,
    line: u32,
}

impl NodeBuilder {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            arguments: Vec::new(),
            tests: Tests::None,
            block: None,
            line: 1,
        }
    }

    /// Set the source line of the node and of arguments added afterwards
    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Add a tagged argument (without leading colon)
    pub fn tag(self, tag: &str) -> Self {
        self.arg(ArgumentValue::Tag(tag.to_string()))
    }

    pub fn string(self, s: &str) -> Self {
        self.arg(ArgumentValue::String(s.to_string()))
    }

    pub fn strings<I, S>(self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg(ArgumentValue::StringList(
            list.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn number(self, n: u64) -> Self {
        self.arg(ArgumentValue::Number(n))
    }

    /// Add an argument of any kind
    pub fn arg(mut self, value: ArgumentValue) -> Self {
        self.arguments.push(Argument::new(value, self.line));
        self
    }

    /// Attach a single sub-test
    pub fn test(mut self, test: NodeBuilder) -> Self {
        self.tests = Tests::Single(Box::new(test.build_test()));
        self
    }

    /// Attach a parenthesized test list
    pub fn tests(mut self, tests: impl IntoIterator<Item = NodeBuilder>) -> Self {
        self.tests = Tests::List(tests.into_iter().map(NodeBuilder::build_test).collect());
        self
    }

    /// Attach a command block
    pub fn block(mut self, commands: Vec<Command>) -> Self {
        self.block = Some(commands);
        self
    }

    /// Finish as a command
    pub fn build(self) -> Command {
        Command {
            identifier: self.identifier,
            arguments: self.arguments,
            tests: self.tests,
            block: self.block,
            line: self.line,
        }
    }

    /// Finish as a test
    pub fn build_test(self) -> Test {
        Test {
            identifier: self.identifier,
            arguments: self.arguments,
            tests: self.tests,
            line: self.line,
        }
    }
}

impl From<NodeBuilder> for Command {
    fn from(builder: NodeBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_nested_if() {
        let cmd = command("if")
            .line(3)
            .test(test("anyof").tests(vec![test("true"), test("false")]))
            .block(vec![command("stop").build()])
            .build();

        assert_eq!(cmd.line, 3);
        assert_eq!(cmd.tests.len(), 1);
        match &cmd.tests {
            Tests::Single(t) => {
                assert_eq!(t.identifier, "anyof");
                assert!(matches!(t.tests, Tests::List(ref l) if l.len() == 2));
            }
            _ => panic!("Expected single test"),
        }
        assert_eq!(cmd.block.as_ref().map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_argument_order_preserved() {
        let t = test("header")
            .tag("comparator")
            .string("i;octet")
            .strings(["to", "cc"])
            .string("x")
            .build_test();

        assert_eq!(t.arguments.len(), 4);
        assert_eq!(t.arguments[0].as_tag(), Some("comparator"));
        assert!(matches!(t.arguments[2].value, ArgumentValue::StringList(ref l) if l.len() == 2));
    }
}
