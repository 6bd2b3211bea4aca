//! metaproxy - file metadata cache daemon
//!
//! Serves cached file-entry metadata to local clients over a Unix socket.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use metaproxy::config::{parse_capacity, Config};
use metaproxy::ipc::IpcServer;
use metaproxy::{LocalEntry, Metadata, MetadataCache, MetadataProxy};

/// CLI command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Run IPC server mode (default)
    Serve,
    /// Print metadata for paths (CLI mode)
    Stat { paths: Vec<PathBuf> },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"metaproxy - Cached file metadata lookups

USAGE:
    metaproxy [OPTIONS]                  # Run IPC server (default)
    metaproxy [OPTIONS] serve
    metaproxy [OPTIONS] stat <path>...
    metaproxy help

COMMANDS:
    serve   Answer getMetadata/getStatus commands on a Unix socket
    stat    Print metadata for each path as JSON, one line per path
    help    Show this help message

OPTIONS:
    --capacity <N>     Maximum number of cached entries
    --socket <PATH>    Unix socket path for serve mode

EXAMPLES:
    # Run IPC server
    metaproxy --socket /tmp/metaproxy.sock

    # Repeated paths are answered from the cache
    metaproxy stat Cargo.toml src Cargo.toml

ENVIRONMENT:
    METAPROXY_CACHE_CAPACITY   Cache capacity (default 10)
    METAPROXY_SOCKET           Socket path (default /tmp/metaproxy.sock)
    RUST_LOG                   Log level (trace, debug, info, warn, error)
"#
    );
}

/// Parse arguments (without the program name), applying option overrides to `config`
fn parse_args(args: &[String], config: &mut Config) -> Result<Command> {
    let mut positional = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--capacity" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--capacity requires a value"))?;
                config.capacity = parse_capacity(raw)?;
            }
            "--socket" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--socket requires a value"))?;
                config.socket_path = PathBuf::from(raw);
            }
            "--help" | "-h" => return Ok(Command::Help),
            _ => positional.push(arg.as_str()),
        }
    }

    match positional.split_first() {
        None | Some((&"serve", [])) => Ok(Command::Serve),
        Some((&"serve", _)) => Err(anyhow!("Usage: metaproxy serve")),
        Some((&"stat", [])) => Err(anyhow!("Usage: metaproxy stat <path>...")),
        Some((&"stat", paths)) => Ok(Command::Stat {
            paths: paths.iter().map(PathBuf::from).collect(),
        }),
        Some((&"help", _)) => Ok(Command::Help),
        Some((other, _)) => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

/// One line of `stat` output
#[derive(Serialize)]
struct StatLine<'a> {
    path: String,
    metadata: &'a Metadata,
}

/// Encode metadata for `path` as a JSON line
fn stat_line(path: &Path, metadata: &Metadata) -> serde_json::Result<String> {
    serde_json::to_string(&StatLine {
        path: path.display().to_string(),
        metadata,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::from_env()?;
    let args: Vec<String> = env::args().skip(1).collect();

    // Parse command
    let command = match parse_args(&args, &mut config) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let cache = Arc::new(MetadataCache::new(config.capacity));
    let proxy = MetadataProxy::new(Arc::clone(&cache));

    match command {
        Command::Serve => {
            info!(
                capacity = config.capacity.get(),
                "Starting metaproxy in IPC server mode"
            );

            let mut ipc_server = IpcServer::new(proxy, config.socket_path.clone());
            if let Err(e) = ipc_server.start().await {
                error!(error = %e, "Failed to start IPC server");
                return Err(e);
            }
            let ipc_server = Arc::new(ipc_server);

            // Run IPC server in a separate task
            let runner = Arc::clone(&ipc_server);
            let ipc_handle = tokio::spawn(async move {
                if let Err(e) = runner.run().await {
                    error!(error = %e, "IPC server error");
                }
            });

            info!("Daemon ready. Waiting for commands...");

            // Wait for Ctrl+C
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;

            info!("Received shutdown signal, stopping...");
            ipc_handle.abort();
            ipc_server.stop().await?;
            cache.log_metrics();

            info!("Shutdown complete.");
        }
        Command::Stat { paths } => {
            let mut failed = false;

            for path in paths {
                let entry = LocalEntry::new(&path)?;
                match proxy.get_entry_metadata(&entry).await {
                    Ok(metadata) => match stat_line(&path, &metadata) {
                        Ok(line) => println!("{}", line),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to encode metadata");
                            failed = true;
                        }
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read metadata");
                        failed = true;
                    }
                }
            }

            let (hits, misses, hit_rate) = cache.stats();
            info!(
                hits = hits,
                misses = misses,
                hit_rate = format!("{:.1}%", hit_rate),
                entries = cache.len(),
                "Cache metrics"
            );

            if failed {
                std::process::exit(1);
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
