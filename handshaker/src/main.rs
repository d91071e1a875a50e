//! magservice - magnet rendezvous server
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! magservice
//!
//! # Listen on a specific address
//! magservice 0.0.0.0:4000 --idle-timeout-secs 60
//! ```
//!
//! Set `RUST_LOG=debug` to see dropped packets and table sweeps.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use magnet_handshaker::{RendezvousConfig, RendezvousServer};
use magnet_shared::constants::{DEFAULT_HANDSHAKER_PORT, REGISTRATION_IDLE_TIMEOUT};

/// Rendezvous server for magnet peers
#[derive(Parser)]
#[command(name = "magservice")]
#[command(about = "UDP rendezvous server pairing magnet peers by name")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(default_value_t = format!("0.0.0.0:{}", DEFAULT_HANDSHAKER_PORT))]
    bind: String,

    /// Forget registrations idle for longer than this
    #[arg(long, default_value_t = REGISTRATION_IDLE_TIMEOUT.as_secs())]
    idle_timeout_secs: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = RendezvousConfig::new(args.bind)
        .with_idle_timeout(Duration::from_secs(args.idle_timeout_secs));

    let mut server = RendezvousServer::bind(&config)
        .with_context(|| format!("failed to start handshaker on {}", config.bind))?;

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "Handshaker stopped");
        return Err(e).context("handshaker socket failed");
    }
    Ok(())
}
