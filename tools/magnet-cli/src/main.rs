//! magnet - command line peer for magnet sessions
//!
//! # Commands
//!
//! - `magnet host [ADDR]` - Wait for a peer to join directly
//! - `magnet join <ADDR>` - Join a hosting peer directly
//! - `magnet await` - Register with the handshaker and wait to be found
//! - `magnet search <NAME>` - Register and search for a peer by name
//! - `magnet config` - Print (or `--save`) the effective configuration
//!
//! # Usage
//!
//! ```bash
//! # On one machine
//! magnet --name alice await
//!
//! # On another
//! magnet --name bob search alice
//! ```
//!
//! Once connected, every line typed on stdin is sent to the peer as chat.

mod config;
mod messages;
mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use magnet_core::{
    ConnectionConfig, DirectTarget, MessageRegistry, PeerConnection, RendezvousTarget,
    register_builtin,
};

use crate::config::Config;
use crate::session::SessionSettings;

/// magnet - peer to peer sessions over UDP
#[derive(Parser)]
#[command(name = "magnet")]
#[command(about = "Meet a peer through a handshaker or directly, then chat")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override config.toml
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Display name
    #[arg(long, global = true)]
    name: Option<String>,

    /// Handshaker address
    #[arg(long, global = true)]
    handshaker: Option<String>,

    /// Direct host port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Heartbeat interval in milliseconds
    #[arg(long, global = true)]
    sync_rate_ms: Option<u64>,

    /// Silence before the peer is flagged disconnected, in milliseconds
    #[arg(long, global = true)]
    disconnect_after_ms: Option<u64>,

    /// Time spent disconnected before giving up, in milliseconds
    #[arg(long, global = true)]
    close_after_ms: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(name) = self.name {
            config.player.name = name;
        }
        if let Some(handshaker) = self.handshaker {
            config.net.handshaker = handshaker;
        }
        if let Some(port) = self.port {
            config.net.port = port;
        }
        if let Some(ms) = self.sync_rate_ms {
            config.net.sync_rate_ms = ms;
        }
        if let Some(ms) = self.disconnect_after_ms {
            config.net.disconnect_after_ms = ms;
        }
        if let Some(ms) = self.close_after_ms {
            config.net.close_after_ms = ms;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a peer to join directly
    Host {
        /// Local address to listen on (defaults to the configured port)
        addr: Option<String>,
    },

    /// Join a hosting peer directly
    Join {
        /// Host address, e.g. 192.168.1.20:20220
        addr: String,
    },

    /// Register with the handshaker and wait to be found
    Await,

    /// Register with the handshaker and search for a peer
    Search {
        /// Name the other peer registered with
        name: String,
    },

    /// Print the effective configuration
    Config {
        /// Write it to config.toml
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::load();
    cli.overrides.apply(&mut config);

    let registry = {
        let mut registry = MessageRegistry::new();
        register_builtin(&mut registry);
        messages::register(&mut registry);
        Arc::new(registry)
    };
    let conn_config = ConnectionConfig::new(config.player.name.clone());

    let conn = match cli.command {
        Commands::Config { save } => return show_config(&config, save),
        Commands::Host { addr } => {
            let addr = addr.unwrap_or_else(|| config.net.host_addr());
            PeerConnection::direct(
                conn_config.with_local_addr(addr.clone()),
                DirectTarget::host(),
                registry,
            )
            .with_context(|| format!("failed to host on {}", addr))?
        }
        Commands::Join { addr } => {
            PeerConnection::direct(conn_config, DirectTarget::join(addr.clone()), registry)
                .with_context(|| format!("failed to join {}", addr))?
        }
        Commands::Await => PeerConnection::rendezvous(
            conn_config,
            RendezvousTarget::wait(config.net.handshaker.clone()),
            registry,
        )
        .with_context(|| format!("failed to register with {}", config.net.handshaker))?,
        Commands::Search { name } => PeerConnection::rendezvous(
            conn_config,
            RendezvousTarget::search(config.net.handshaker.clone(), name),
            registry,
        )
        .with_context(|| format!("failed to register with {}", config.net.handshaker))?,
    };

    session::run(
        conn,
        SessionSettings {
            name: config.player.name.clone(),
            sync_rate: config.net.sync_rate(),
            disconnect_after: config.net.disconnect_after(),
            close_after: config.net.close_after(),
        },
    )
}

fn show_config(config: &Config, save: bool) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    if save {
        match config::save(config)? {
            Some(path) => println!("# saved to {}", path.display()),
            None => println!("# no config directory available, not saved"),
        }
    }
    Ok(())
}
