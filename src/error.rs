//! Error types for HadroDB storage engine.

use std::io;
use thiserror::Error;

/// The result type used throughout HadroDB.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for HadroDB operations.
///
/// Every public operation fails with one of these kinds, so callers can tell a
/// missing key from a corrupt log from a failing disk.
#[derive(Debug, Error)]
pub enum Error {
    /// The collection path exists but cannot hold a log (e.g. it is a file).
    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    /// A row does not match the collection schema (arity, type or nullability).
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Fewer bytes were available than a frame header promised.
    #[error("Short read at offset {offset}: expected {expected} bytes, {available} available")]
    ShortRead {
        /// Offset the read started at.
        offset: u64,
        /// Number of bytes requested.
        expected: u64,
        /// Number of bytes actually available from `offset`.
        available: u64,
    },

    /// The requested key has no live record.
    #[error("Key not found")]
    KeyNotFound,

    /// An I/O error occurred on the storage medium.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine has been closed.
    #[error("Database is closed")]
    Closed,
}

impl Error {
    /// Creates a new corrupt record error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::CorruptRecord(msg.into())
    }

    /// Creates a new schema mismatch error.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid collection error.
    pub fn invalid_collection(msg: impl Into<String>) -> Self {
        Error::InvalidCollection(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bad tag");
        assert_eq!(err.to_string(), "Corrupt record: bad tag");

        let err = Error::ShortRead { offset: 10, expected: 20, available: 4 };
        let msg = err.to_string();
        assert!(msg.contains("offset 10"));
        assert!(msg.contains("expected 20"));
        assert!(msg.contains("4 available"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
