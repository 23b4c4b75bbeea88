//! Message collaborator interfaces
//!
//! The interpreter never parses messages itself. Header values, size and
//! envelope come from a [`MessageSource`] supplied by the delivery
//! pipeline; header edits go through an optional [`HeaderEditor`].

use crate::extension::ExtId;
use crate::vm::ExtContexts;
use std::any::Any;
use thiserror::Error;

/// Failures reported by message collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Transient condition; the delivery can be retried
    #[error("temporary message failure: {0}")]
    Temporary(String),

    /// The requested data is broken or unavailable
    #[error("message failure: {0}")]
    Permanent(String),

    /// The collaborator does not implement the operation
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// Envelope parts addressable by the `envelope` test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopePart {
    /// Return path (MAIL FROM)
    From,
    /// Final recipient (RCPT TO)
    To,
}

impl EnvelopePart {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("from") {
            Some(EnvelopePart::From)
        } else if name.eq_ignore_ascii_case("to") {
            Some(EnvelopePart::To)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EnvelopePart::From => "from",
            EnvelopePart::To => "to",
        }
    }
}

/// Read access to the message being filtered
pub trait MessageSource {
    /// Unfolded values of every occurrence of a header field, in order
    fn header_values(&self, name: &str) -> Result<Vec<String>, MessageError>;

    /// Message size in octets
    fn size(&self) -> Result<u64, MessageError>;

    /// Envelope address without angle brackets; `Some("")` for the null
    /// return path
    fn envelope(&self, part: EnvelopePart) -> Result<Option<String>, MessageError>;

    /// Header editing capability, if the pipeline allows modifications
    fn editor(&mut self) -> Option<&mut dyn HeaderEditor> {
        None
    }
}

/// Header modification capability
pub trait HeaderEditor {
    /// Add a field at the top of the header, or at the bottom when `last`
    fn add_header(&mut self, name: &str, value: &str, last: bool) -> Result<(), MessageError>;

    /// Delete one occurrence (1-based, counted from the top) or, with
    /// `None`, every occurrence of a field
    fn delete_header(&mut self, name: &str, occurrence: Option<usize>) -> Result<(), MessageError>;
}

/// State shared by every script run against the same message
///
/// Extensions keep per-message data here. A delivery that runs several
/// scripts for one message passes the same context to each run and calls
/// [`MessageContext::reset`] before moving on to the next message.
#[derive(Debug, Default)]
pub struct MessageContext {
    contexts: ExtContexts,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all per-message extension state
    pub fn reset(&mut self) {
        self.contexts.clear();
    }

    /// Per-message context of an extension, created on first use
    pub fn context_mut<T: Any + Send + Default>(&mut self, ext: ExtId) -> &mut T {
        self.contexts.get_or_default(ext)
    }

    pub fn context<T: Any + Send>(&self, ext: ExtId) -> Option<&T> {
        self.contexts.get(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_part_names() {
        assert_eq!(EnvelopePart::from_name("FROM"), Some(EnvelopePart::From));
        assert_eq!(EnvelopePart::from_name("to"), Some(EnvelopePart::To));
        assert_eq!(EnvelopePart::from_name("auth"), None);
    }

    #[test]
    fn test_message_context_reset() {
        let mut ctx = MessageContext::new();
        *ctx.context_mut::<u32>(ExtId(4)) += 2;
        assert_eq!(ctx.context::<u32>(ExtId(4)), Some(&2));
        ctx.reset();
        assert_eq!(ctx.context::<u32>(ExtId(4)), None);
    }
}
