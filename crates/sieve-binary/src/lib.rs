//! Binary container for compiled Sieve programs
//!
//! A compiled script is a set of numbered byte blocks plus the table of
//! extensions it was linked against, wrapped in a small versioned header.
//!
//! # Modules
//!
//! - `binary`: building, saving, loading and lazy block access
//! - `code`: primitive codec used inside blocks (bytes, varints, strings, jump offsets)
//! - `header`: file header and block index records
//! - `metadata`: script metadata block
//! - `lock`: bounded advisory locking for header updates
//! - `error`: error types

pub mod binary;
pub mod code;
pub mod error;
pub mod header;
pub mod lock;
pub mod metadata;

// Re-export commonly used items
pub use binary::{
    Binary, BinaryBuilder, ExtensionCheck, LinkedExtension, NoHooks, SaveHooks, UsageUpdate,
    BLOCK_EXTENSIONS, BLOCK_MAIN_PROGRAM, BLOCK_METADATA, NO_BLOCK, RESERVED_BLOCKS,
};
pub use code::{CodeBuffer, CodeReader, OFFSET_SIZE};
pub use error::{BinaryError, CodeError};
pub use header::{Header, ResourceUsage};
pub use metadata::ScriptMetadata;
