//! File-system entry implementations

pub mod local;

pub use local::LocalEntry;
