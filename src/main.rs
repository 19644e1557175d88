//! Operator CLI for the SSH dispatch layer.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!   SSH server     │                  DISPATCH LAYER                   │
//!   (protocol)     │                                                   │
//!   ───────────────┼─▶ Dispatcher ──▶ ConnectionCoordinator            │
//!   accept         │                      │                            │
//!   auth           │                      ├─▶ config resolver ◀── config server
//!   handshake      │                      ├─▶ backend registry         │
//!   disconnect     │                      ├─▶ security overlay         │
//!   shutdown       │                      └─▶ BackendHandler ──────────┼──▶ container /
//!                  │                                                   │    pod / proxy
//!                  └──────────────────────────────────────────────────┘
//! ```
//!
//! The binary does not accept SSH connections. It validates configuration
//! files and previews the configuration a given connection would receive.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ssh_dispatch::backend::BackendRegistry;
use ssh_dispatch::config::loader::load_config;
use ssh_dispatch::net::connection::ConnectionId;
use ssh_dispatch::observability::logging::init_logging;
use ssh_dispatch::observability::metrics::MetricsFacadeSink;
use ssh_dispatch::{AuthDecision, Dispatcher};

#[derive(Parser)]
#[command(name = "ssh-dispatch")]
#[command(about = "Inspect SSH dispatch configuration", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Answer given to every authentication attempt
    #[arg(long, value_enum, default_value_t = AuthDecision::Granted)]
    default_auth: AuthDecision,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print a summary
    Check,
    /// Print the configuration a connection would run with
    Resolve {
        #[arg(short, long)]
        username: String,

        #[arg(long, default_value = "127.0.0.1:22")]
        remote_addr: SocketAddr,

        #[arg(long)]
        connection_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    init_logging(&config.log)?;

    tracing::info!(path = %cli.config.display(), backend = %config.backend, "Configuration loaded");

    let dispatcher = Dispatcher::new(config, BackendRegistry::new(), &MetricsFacadeSink::new(), cli.default_auth)?;

    match cli.command {
        Commands::Check => {
            let config = dispatcher.config();
            let backend = if config.backend.is_empty() {
                "<from configuration server>"
            } else {
                config.backend.as_str()
            };
            println!("configuration ok");
            println!("  backend:       {backend}");
            println!("  security:      {}", if config.security.enabled { "enabled" } else { "disabled" });
            println!("  default auth:  {}", dispatcher.default_auth());
            if config.config_server.is_enabled() {
                println!(
                    "  config server: {} (timeout {}s)",
                    config.config_server.url, config.config_server.timeout_secs
                );
            }
        }
        Commands::Resolve {
            username,
            remote_addr,
            connection_id,
        } => {
            let connection_id = connection_id.map(ConnectionId::new).unwrap_or_else(ConnectionId::generate);
            let resolved = dispatcher
                .preview_connection_config(&username, remote_addr, &connection_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }

    Ok(())
}
