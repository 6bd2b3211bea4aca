//! Fetch Error Types
//!
//! Failures raised while fetching metadata for an entry. The proxy never
//! retries or caches these; they go straight back to the caller.

use std::io;

/// Metadata fetch error types
///
/// Cloneable so a single in-flight fetch can hand its result to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid entry URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

impl FetchError {
    /// Map an I/O error raised for `url` to a fetch error
    pub fn from_io(err: &io::Error, url: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(url.to_string()),
            io::ErrorKind::PermissionDenied => FetchError::PermissionDenied(url.to_string()),
            _ => FetchError::Io(format!("{}: {}", url, err)),
        }
    }
}
