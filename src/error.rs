use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds surfaced by the core APIs.
///
/// Background indexing swallows the per-item kinds (`MalformedClass`,
/// `ArchiveUnreadable`) after logging them; query and detail requests
/// return them to the caller as values.
#[derive(Error, Debug)]
pub enum JardexError {
    #[error("malformed class file: {0}")]
    MalformedClass(String),

    #[error("unreadable archive {path}: {reason}")]
    ArchiveUnreadable { path: PathBuf, reason: String },

    #[error("decompiler unavailable: {0}")]
    DecompilerUnavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}
