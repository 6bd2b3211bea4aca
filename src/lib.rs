//! metaproxy - read-through LRU cache for file-entry metadata
//!
//! Entries are identified by URL. Metadata is fetched from the entry on a miss,
//! stored in a bounded LRU cache and served from there afterwards.

pub mod cache;
pub mod config;
pub mod entry;
pub mod fs;
pub mod ipc;
pub mod proxy;

pub use cache::MetadataCache;
pub use config::Config;
pub use entry::{Entry, FetchError, Metadata};
pub use fs::LocalEntry;
pub use proxy::MetadataProxy;
