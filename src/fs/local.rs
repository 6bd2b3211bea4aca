//! Local File-System Entries
//!
//! Entries backed by the host file system, identified by `file://` URLs.
//! Metadata is read with `tokio::fs` so lookups never block the runtime.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::trace;
use url::Url;

use crate::entry::{Entry, FetchError, Metadata};

/// A file or directory on the local file system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Absolute path of the entry
    path: PathBuf,
    /// `file://` URL for the path
    url: Url,
}

impl LocalEntry {
    /// Create an entry for `path`, resolving relative paths against the
    /// current directory
    pub fn new(path: impl AsRef<Path>) -> Result<Self, FetchError> {
        let path = path.as_ref();
        let absolute = std::path::absolute(path)
            .map_err(|e| FetchError::Io(format!("{}: {}", path.display(), e)))?;

        let url = Url::from_file_path(&absolute)
            .map_err(|_| FetchError::InvalidUrl(absolute.display().to_string()))?;

        Ok(Self {
            path: absolute,
            url,
        })
    }

    /// Create an entry from a `file://` URL
    pub fn from_url(url: &str) -> Result<Self, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        if parsed.scheme() != "file" {
            return Err(FetchError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                url,
                parsed.scheme()
            )));
        }

        let path = parsed
            .to_file_path()
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        Ok(Self { path, url: parsed })
    }

    /// Absolute path of the entry
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Entry for LocalEntry {
    fn to_url(&self) -> String {
        self.url.to_string()
    }

    async fn get_metadata(&self) -> Result<Metadata, FetchError> {
        trace!(path = %self.path.display(), "Reading file metadata");

        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| FetchError::from_io(&e, self.url.as_str()))?;

        Ok(Metadata::from(&meta))
    }
}
