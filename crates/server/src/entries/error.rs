//! Errors produced by the file entry service.

use std::io;

use thiserror::Error;

/// Errors that can occur while resolving or operating on library entries.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The user-supplied path would escape the library root.
    #[error("path escapes library root: {0:?}")]
    PathTraversal(String),

    /// The operation is not allowed on this target (e.g. the library root).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The requested entry does not exist or cannot be downloaded.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
