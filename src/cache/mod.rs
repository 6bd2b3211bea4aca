//! Metadata caching layer
//!
//! Bounded LRU storage for entry metadata, shared between proxy callers.

pub mod metadata;

pub use metadata::MetadataCache;
