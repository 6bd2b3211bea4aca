//! IPC protocol definitions
//!
//! Newline-delimited JSON exchanged with local clients over a Unix domain socket.

use serde::{Deserialize, Serialize};

use crate::entry::Metadata;

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Get metadata for an entry, given either its URL or a local path
    #[serde(rename_all = "camelCase")]
    GetMetadata {
        /// `file://` URL of the entry
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Local path of the entry
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// Get daemon status and cache statistics
    GetStatus,
}

/// Responses sent back to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Metadata for the requested entry
    #[serde(rename_all = "camelCase")]
    Metadata {
        /// URL the metadata was resolved for
        url: String,
        /// Entry metadata
        metadata: Metadata,
    },
    /// Error response
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error message
        error: String,
    },
    /// Status response with cache state
    #[serde(rename_all = "camelCase")]
    Status {
        /// Protocol version
        version: u32,
        /// Whether daemon is healthy
        healthy: bool,
        /// Maximum number of cached entries
        capacity: usize,
        /// Current number of cached entries
        entries: usize,
        /// Cache hits since start
        hits: u64,
        /// Cache misses since start
        misses: u64,
        /// Hit rate in percent
        hit_rate: f64,
    },
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}
