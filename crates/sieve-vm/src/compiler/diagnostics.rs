//! Compile-time diagnostics

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Failure inside the compiler itself; validation stops immediately
    Internal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Internal => "internal error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Script line, when the message concerns a specific node
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}: {}", line, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Diagnostics collected during one compilation
///
/// Errors beyond `max_errors` are dropped and mark the collection as
/// aborted, as does any internal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    max_errors: usize,
    errors: usize,
    aborted: bool,
}

impl Diagnostics {
    pub fn new(max_errors: usize) -> Self {
        Self {
            items: Vec::new(),
            max_errors,
            errors: 0,
            aborted: false,
        }
    }

    fn push(&mut self, severity: Severity, line: Option<u32>, message: String) {
        if self.aborted {
            return;
        }
        if severity >= Severity::Error {
            self.errors += 1;
        }
        tracing::debug!(%severity, line, message = %message, "script diagnostic");
        self.items.push(Diagnostic {
            severity,
            line,
            message,
        });
        if severity == Severity::Internal || self.errors >= self.max_errors {
            self.aborted = true;
        }
    }

    pub fn error(&mut self, line: u32, message: impl Into<String>) {
        self.push(Severity::Error, Some(line), message.into());
    }

    pub fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.push(Severity::Warning, Some(line), message.into());
    }

    pub fn info(&mut self, line: u32, message: impl Into<String>) {
        self.push(Severity::Info, Some(line), message.into());
    }

    pub fn internal(&mut self, message: impl Into<String>) {
        self.push(Severity::Internal, None, message.into());
    }

    /// Record an error after which validation cannot continue
    pub fn fatal(&mut self, line: Option<u32>, message: impl Into<String>) {
        self.push(Severity::Error, line, message.into());
        self.aborted = true;
    }

    /// Errors and internal errors recorded
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Validation must stop
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any diagnostic message contains `text`
    pub fn mentions(&self, text: &str) -> bool {
        self.items.iter().any(|d| d.message.contains(text))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_cap_aborts() {
        let mut diags = Diagnostics::new(2);
        diags.warning(1, "w");
        diags.error(2, "first");
        assert!(!diags.aborted());
        diags.error(3, "second");
        assert!(diags.aborted());
        diags.error(4, "dropped");
        assert_eq!(diags.error_count(), 2);
        assert_eq!(diags.len(), 3);
    }

    #[test]
    fn test_internal_aborts_immediately() {
        let mut diags = Diagnostics::new(10);
        diags.internal("broken registry");
        assert!(diags.aborted());
        assert!(diags.has_errors());
        assert_eq!(diags.to_string(), "internal error: broken registry\n");
    }

    #[test]
    fn test_fatal_error_aborts() {
        let mut diags = Diagnostics::new(10);
        diags.fatal(None, "extension conflict");
        assert!(diags.aborted());
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_display_with_line() {
        let mut diags = Diagnostics::new(10);
        diags.error(7, "unknown command 'frobnicate'");
        let first = diags.iter().next().unwrap();
        assert_eq!(first.to_string(), "line 7: error: unknown command 'frobnicate'");
    }
}
