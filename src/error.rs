//! Crate-wide error type.
//!
//! Every fallible engine operation returns `Result<T, EngineError>`. The
//! engine never panics on a caller-triggerable condition and never calls
//! `std::process::exit`; that is the host's call.

use std::fmt;

/// Errors surfaced by the engine to its caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An allocation failed. Treated as fatal to the document it occurred
    /// in; there is no recovery path for an allocator that has given up.
    #[error("out of memory")]
    OutOfMemory,

    /// The source file is at or above `2^(W-1)` bytes, the largest length a
    /// [`crate::piece::Piece`] can represent.
    #[error("file too big: {size} bytes exceeds the {limit} byte piece limit")]
    FileTooBig { size: u64, limit: u64 },

    /// The path did not exist at open time. Non-fatal: the caller opens an
    /// empty document associated with the path instead.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A mapping, read, write, rename, or sync failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single input event carried bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in input")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The benchmark/fixture harness input was malformed.
    #[error("malformed fixture: {0}")]
    BadFixtureFormat(String),
}

impl EngineError {
    /// Maps a raw I/O error the way the file lifecycle does at open time:
    /// `NotFound` becomes the engine's own not-found condition, everything
    /// else is a generic I/O failure.
    pub(crate) fn from_open_io(err: std::io::Error, path: impl fmt::Display) -> EngineError {
        match err.kind() {
            std::io::ErrorKind::NotFound => EngineError::FileNotFound(path.to_string()),
            _ => EngineError::Io(err),
        }
    }
}
