//! parley daemon - multi-client line chat server
//!
//! Accepts TCP connections, asks each client to identify with
//! `:meet <name>`, then relays chat lines between members.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (3456) with room for 10 members
//! parleyd
//!
//! # Custom port and capacity
//! parleyd -p 4000 -c 25
//!
//! # Settings from a TOML file, with the port overridden
//! parleyd --config parley.toml -p 4000
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use parleyd::config::{ServerConfig, CONFIG_ENV};
use parleyd::registry::{spawn_registry, RegistryHandle};
use parleyd::server::ChatServer;

/// Maximum time to wait for members to leave after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// parley - multi-client line chat server
#[derive(Parser, Debug)]
#[command(name = "parleyd", version, about)]
struct Args {
    /// Port to listen on [default: 3456]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Maximum number of connected members [default: 10]
    #[arg(short = 'c', long)]
    capacity: Option<usize>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(short = 'b', long)]
    bind: Option<IpAddr>,

    /// TOML config file
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let base = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        Ok(base.with_overrides(self.bind, self.port, self.capacity))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parleyd=info".parse()?)
                .add_directive("parley_core=info".parse()?)
                .add_directive("parley_protocol=info".parse()?),
        )
        .init();

    let config = args.server_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "parley daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(config.capacity);
    info!(capacity = config.capacity, "Member registry started");

    let server = ChatServer::bind(config.socket_addr(), registry.clone(), cancel_token)
        .await
        .with_context(|| format!("Failed to start server on {}", config.socket_addr()))?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    wait_for_members_to_leave(&registry).await;

    info!("parley daemon stopped");
    Ok(())
}

async fn wait_for_members_to_leave(registry: &RegistryHandle) {
    let drained = timeout(SHUTDOWN_GRACE, async {
        while registry.count().await > 0 {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = registry.count().await,
            "Members still connected at shutdown"
        );
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
