//! # Storage Error Kinds
//!
//! The storage API distinguishes a small set of error kinds so callers can
//! branch on them (an executor translates `DuplicateKey` into update
//! semantics, a REPL reports `NotFound` without a stack trace). Everything
//! else rides through `eyre::Report` with context attached at the point of
//! failure.
//!
//! `StorageError` values are raised with `eyre::bail!` and recovered with
//! `Report::downcast_ref::<StorageError>()`. I/O errors are not represented
//! here; they stay `std::io::Error` inside the report chain and are fatal
//! for the session, as are `CorruptPage` and `InvariantViolation`. The
//! remaining kinds are user errors and leave the database unchanged.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    /// Insert found an existing cell with the same key.
    #[error("duplicate key")]
    DuplicateKey,

    /// Delete (or a keyed lookup that requires presence) missed.
    #[error("key not found")]
    NotFound,

    /// A record (or its cell) exceeds what a single leaf page can hold.
    #[error("record too large: {size} bytes exceeds maximum of {max}")]
    TooLarge { size: usize, max: usize },

    /// Values do not conform to the schema, or record bytes failed to
    /// decode under it.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A tree invariant failed during validation. Diagnostic; should never
    /// occur on a correct implementation.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A page header failed sanity checks on read. Fatal for the session.
    #[error("corrupt page: {0}")]
    CorruptPage(String),
}
