//! Entry metadata type and conversion from file-system metadata

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata for a file or directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Size in bytes
    pub size: u64,
    /// Last modification time, as signed milliseconds since the Unix epoch on the wire
    #[serde(with = "epoch_millis")]
    pub modification_time: SystemTime,
    /// Whether the entry is a directory
    pub is_directory: bool,
    /// Whether the entry is read-only
    pub read_only: bool,
}

impl From<&fs::Metadata> for Metadata {
    fn from(meta: &fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            // Platforms without mtime support report the epoch
            modification_time: meta.modified().unwrap_or(UNIX_EPOCH),
            is_directory: meta.is_dir(),
            read_only: meta.permissions().readonly(),
        }
    }
}

/// Signed millisecond timestamps, so times before 1970 still serialize
mod epoch_millis {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_millis())
                .map(|m| -m)
                .unwrap_or(i64::MIN),
        };
        serializer.serialize_i64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        let offset = Duration::from_millis(millis.unsigned_abs());
        let time = if millis >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        time.ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis)))
    }
}
