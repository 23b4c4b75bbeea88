//! Error types for the binary container and the block codec

use std::io;
use thiserror::Error;

/// Errors raised while creating, loading or saving a binary
#[derive(Debug, Error)]
pub enum BinaryError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a binary this implementation can read
    #[error("not a valid binary: {0}")]
    NotValid(String),

    /// The magic was found byte-reversed
    #[error("binary was written with the opposite byte order")]
    EndianMismatch,

    /// Structure inside an otherwise valid file is inconsistent
    #[error("binary is corrupt: {0}")]
    Corrupt(String),

    /// A linked extension is missing or has another version
    #[error("binary requires extension `{name}` version {version}, which is not available")]
    IncompatibleExtension { name: String, version: u32 },

    /// An extension refused the save
    #[error("saving the binary was vetoed: {0}")]
    SaveVetoed(String),

    /// Block id outside the block table
    #[error("block {0} does not exist")]
    NoSuchBlock(u32),
}

impl BinaryError {
    /// Whether the error means the binary must be recompiled
    ///
    /// I/O errors are transient and do not invalidate the binary itself.
    pub fn invalidates(&self) -> bool {
        !matches!(self, BinaryError::Io(_))
    }

    /// Whether the binary file simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, BinaryError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// Decoding failures inside a block's byte stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// The stream ended in the middle of an item
    #[error("unexpected end of code at address {address}")]
    UnexpectedEnd { address: usize },

    /// Variable-length integer does not fit in 64 bits
    #[error("integer overflow at address {address}")]
    IntegerOverflow { address: usize },

    /// String payload is not valid UTF-8
    #[error("invalid UTF-8 string at address {address}")]
    InvalidUtf8 { address: usize },

    /// Any other structural violation (class mismatch, bad opcode, bad jump)
    #[error("malformed code at address {address}: {reason}")]
    Malformed { address: usize, reason: String },
}

impl CodeError {
    pub fn malformed(address: usize, reason: impl Into<String>) -> Self {
        CodeError::Malformed {
            address,
            reason: reason.into(),
        }
    }

    /// Address at which decoding failed
    pub fn address(&self) -> usize {
        match self {
            CodeError::UnexpectedEnd { address }
            | CodeError::IntegerOverflow { address }
            | CodeError::InvalidUtf8 { address }
            | CodeError::Malformed { address, .. } => *address,
        }
    }
}

impl From<CodeError> for BinaryError {
    fn from(err: CodeError) -> Self {
        BinaryError::Corrupt(err.to_string())
    }
}
