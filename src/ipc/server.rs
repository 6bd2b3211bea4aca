//! IPC Server - Unix socket server for metadata lookups
//!
//! Handles incoming connections from local clients and answers commands
//! through a shared MetadataProxy.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::entry::Entry;
use crate::fs::LocalEntry;
use crate::ipc::protocol::{parse_command, serialize_response, Command, Response, PROTOCOL_VERSION};
use crate::proxy::MetadataProxy;

/// IPC Server that answers metadata commands from local clients
pub struct IpcServer {
    /// Read-through proxy shared by all connections
    proxy: MetadataProxy,
    /// Path of the Unix socket
    socket_path: PathBuf,
    /// Socket listener
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(proxy: MetadataProxy, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            proxy,
            socket_path: socket_path.into(),
            listener: None,
            connection_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Start the IPC server
    pub async fn start(&mut self) -> Result<()> {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        // Create the socket listener
        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", self.socket_path))?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let proxy = self.proxy.clone();
                    let connection_count = Arc::clone(&self.connection_count);

                    // Spawn a new task to handle this connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, proxy, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Stop the IPC server and clean up
    pub async fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove socket file")?;
        }
        info!("IPC server stopped");
        Ok(())
    }

    /// Path of the Unix socket
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the number of active connections
    pub async fn connection_count(&self) -> u32 {
        *self.connection_count.read().await
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    proxy: MetadataProxy,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    // Increment connection count
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    // Read commands line by line (newline-delimited JSON)
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(command = %trimmed, "Received command");

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &proxy).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        Response::Error {
                            error: format!("Invalid command: {}", e),
                        }
                    }
                };

                let json = match serialize_response(&response) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                        let error_response = Response::Error {
                            error: format!("Failed to serialize response: {}", e),
                        };
                        match serialize_response(&error_response) {
                            Ok(json) => json,
                            Err(_) => continue,
                        }
                    }
                };

                if let Err(e) = writer.write_all(&json).await {
                    error!(error = %e, "Failed to write response");
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    // Decrement connection count
    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}

/// Process a command and return a response
async fn process_command(command: Command, proxy: &MetadataProxy) -> Response {
    match command {
        Command::GetMetadata { url, path } => {
            let entry = match (url, path) {
                (Some(url), _) => LocalEntry::from_url(&url),
                (None, Some(path)) => LocalEntry::new(path),
                (None, None) => {
                    return Response::Error {
                        error: "getMetadata requires a url or a path".to_string(),
                    };
                }
            };

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Response::Error { error: e.to_string() },
            };

            match proxy.get_entry_metadata(&entry).await {
                Ok(metadata) => Response::Metadata {
                    url: entry.to_url(),
                    metadata,
                },
                Err(e) => Response::Error { error: e.to_string() },
            }
        }

        Command::GetStatus => {
            debug!("Processing getStatus command");

            let cache = proxy.cache();
            let (hits, misses, hit_rate) = cache.stats();

            Response::Status {
                version: PROTOCOL_VERSION,
                healthy: true,
                capacity: cache.capacity(),
                entries: cache.len(),
                hits,
                misses,
                hit_rate,
            }
        }
    }
}
