//! File-system entries and their metadata source

pub mod errors;
pub mod types;

use async_trait::async_trait;

pub use errors::FetchError;
pub use types::Metadata;

/// A file-system entry that can report its own metadata
///
/// `to_url` must be stable for the lifetime of the entry; it is the cache key.
#[async_trait]
pub trait Entry: Send + Sync {
    /// Stable URL identifying this entry
    fn to_url(&self) -> String;

    /// Fetch fresh metadata from the underlying file system
    async fn get_metadata(&self) -> Result<Metadata, FetchError>;
}
