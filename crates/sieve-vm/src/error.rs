//! Error types for the compiler and the interpreter

use crate::compiler::diagnostics::Diagnostics;
use crate::message::MessageError;
use crate::result::ActionError;
use sieve_binary::{BinaryError, CodeError};
use std::fmt;
use thiserror::Error;

/// Outcome of running a script, as reported to the delivery pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecStatus {
    /// Script ran and its result was applied
    Ok,
    /// Script failed; the caller should still apply the implicit keep
    Failure,
    /// A collaborator reported a transient error; retry later
    TempFailure,
    /// The binary violated a decode invariant; recompile once and retry
    BinCorrupt,
    /// Even the fallback keep could not be stored
    KeepFailed,
    /// Cumulative resource usage tripped the configured limit
    ResourceLimit,
}

impl ExecStatus {
    pub fn is_ok(self) -> bool {
        self == ExecStatus::Ok
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecStatus::Ok => "ok",
            ExecStatus::Failure => "failure",
            ExecStatus::TempFailure => "temporary failure",
            ExecStatus::BinCorrupt => "binary corrupt",
            ExecStatus::KeepFailed => "keep failed",
            ExecStatus::ResourceLimit => "resource limit exceeded",
        };
        write!(f, "{}", name)
    }
}

/// Interpreter errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Decoding the program failed
    #[error("corrupt binary at address {address}: {reason}")]
    Corrupt { address: usize, reason: String },

    /// Loading a block or the binary itself failed
    #[error(transparent)]
    Binary(#[from] BinaryError),

    /// The message source failed
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Script-level failure (limits, invalid runtime values)
    #[error("script failed: {0}")]
    Failure(String),

    /// Run or cumulative CPU time limit exceeded
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Committing the result failed and the fallback keep failed as well
    #[error("fallback keep failed: {0}")]
    KeepFailed(#[source] ActionError),
}

impl RuntimeError {
    pub fn corrupt(address: usize, reason: impl Into<String>) -> Self {
        RuntimeError::Corrupt {
            address,
            reason: reason.into(),
        }
    }

    /// Status code reported for this error
    pub fn status(&self) -> ExecStatus {
        match self {
            RuntimeError::Corrupt { .. } => ExecStatus::BinCorrupt,
            RuntimeError::Binary(e) if e.invalidates() => ExecStatus::BinCorrupt,
            RuntimeError::Binary(_) => ExecStatus::TempFailure,
            RuntimeError::Message(MessageError::Temporary(_)) => ExecStatus::TempFailure,
            RuntimeError::Message(_) => ExecStatus::Failure,
            RuntimeError::Failure(_) => ExecStatus::Failure,
            RuntimeError::ResourceLimit(_) => ExecStatus::ResourceLimit,
            RuntimeError::KeepFailed(_) => ExecStatus::KeepFailed,
        }
    }
}

impl From<CodeError> for RuntimeError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::Malformed { address, reason } => RuntimeError::Corrupt { address, reason },
            other => RuntimeError::Corrupt {
                address: other.address(),
                reason: other.to_string(),
            },
        }
    }
}

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// Validation reported at least one error
    #[error("script validation failed with {} error(s)", .0.error_count())]
    Validation(Diagnostics),

    /// The validated tree could not be turned into code
    #[error("code generation failed: {0}")]
    Generation(String),

    /// Storing or loading the binary failed
    #[error(transparent)]
    Binary(#[from] BinaryError),
}

impl CompileError {
    /// Diagnostics collected before the failure, if any
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            CompileError::Validation(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RuntimeError::corrupt(3, "bad operand").status(),
            ExecStatus::BinCorrupt
        );
        assert_eq!(
            RuntimeError::Message(MessageError::Temporary("db down".into())).status(),
            ExecStatus::TempFailure
        );
        assert_eq!(
            RuntimeError::Message(MessageError::Permanent("gone".into())).status(),
            ExecStatus::Failure
        );
        assert_eq!(
            RuntimeError::Binary(BinaryError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk"
            )))
            .status(),
            ExecStatus::TempFailure
        );
        assert_eq!(
            RuntimeError::Binary(BinaryError::EndianMismatch).status(),
            ExecStatus::BinCorrupt
        );
    }

    #[test]
    fn test_code_error_keeps_address() {
        let err: RuntimeError = CodeError::UnexpectedEnd { address: 17 }.into();
        match err {
            RuntimeError::Corrupt { address, .. } => assert_eq!(address, 17),
            other => panic!("Expected Corrupt, got {:?}", other),
        }
    }
}
