//! Error types for the adapter contract
//!
//! Every operation a backend exposes fails with one of the classes below.
//! The payload is the raw backend text so the harness can surface it verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for adapter operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors a backend may return
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StoreError {
    /// Backend could not initialize at the given location
    #[error("open failed: {0}")]
    Open(String),

    /// Single or batch write rejected
    #[error("write failed: {0}")]
    Write(String),

    /// Iterator could not be created or failed while advancing
    #[error("iteration failed: {0}")]
    Iterate(String),

    /// Handle, batch or cursor failed to release cleanly
    #[error("close failed: {0}")]
    Close(String),
}

impl StoreError {
    /// Create an open error
    pub fn open(msg: impl Into<String>) -> Self {
        StoreError::Open(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        StoreError::Write(msg.into())
    }

    /// Create an iteration error
    pub fn iterate(msg: impl Into<String>) -> Self {
        StoreError::Iterate(msg.into())
    }

    /// Create a close error
    pub fn close(msg: impl Into<String>) -> Self {
        StoreError::Close(msg.into())
    }

    /// Write rejected because a length does not fit an internal counter.
    pub fn overflow(what: &str, len: usize, limit: usize) -> Self {
        StoreError::Write(format!(
            "{} of {} bytes overflows the {} byte limit",
            what, len, limit
        ))
    }

    /// Short class name used in reports
    pub fn class(&self) -> &'static str {
        match self {
            StoreError::Open(_) => "OpenError",
            StoreError::Write(_) => "WriteError",
            StoreError::Iterate(_) => "IterateError",
            StoreError::Close(_) => "CloseError",
        }
    }

    /// Raw backend text without the class prefix
    pub fn detail(&self) -> &str {
        match self {
            StoreError::Open(m)
            | StoreError::Write(m)
            | StoreError::Iterate(m)
            | StoreError::Close(m) => m,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Write(e.to_string())
    }
}
