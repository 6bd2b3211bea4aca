//! Daemon configuration from environment variables

use anyhow::{anyhow, Result};
use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Default number of cached entries
pub const DEFAULT_CAPACITY: usize = 10;

/// Default socket path for IPC communication
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/metaproxy.sock";

/// Environment variable overriding the cache capacity
pub const CAPACITY_VAR: &str = "METAPROXY_CACHE_CAPACITY";

/// Environment variable overriding the socket path
pub const SOCKET_VAR: &str = "METAPROXY_SOCKET";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of cached metadata entries
    pub capacity: NonZeroUsize,
    /// Unix socket the IPC server listens on
    pub socket_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration using `lookup` to resolve variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let capacity = match lookup(CAPACITY_VAR) {
            Some(raw) => parse_capacity(&raw).map_err(|e| anyhow!("{}: {}", CAPACITY_VAR, e))?,
            None => default_capacity(),
        };

        let socket_path = lookup(SOCKET_VAR)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));

        Ok(Self {
            capacity,
            socket_path,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

/// Parse a positive cache capacity
pub fn parse_capacity(raw: &str) -> Result<NonZeroUsize> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid capacity '{}': {}", raw, e))?;
    NonZeroUsize::new(value).ok_or_else(|| anyhow!("capacity must be greater than zero"))
}

fn default_capacity() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN)
}
