//! xhttp-client
//!
//! Accepts local TCP sockets and carries each one to a remote server over
//! HTTP, either as a split GET/POST pair or as a single HTTP/2 exchange.
//!
//! ```text
//!   local app ──TCP──▶ listener ──▶ forwarder ──▶ tunnel ──HTTP──▶ CDN / proxy ──▶ server
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use xhttp_client::config::{load_config, TransportKind};
use xhttp_client::lifecycle::signals::shutdown_signal;
use xhttp_client::net::{Forwarder, Listener};
use xhttp_client::observability::{logging, metrics};
use xhttp_client::{Shutdown, Tunnel};

#[derive(Parser)]
#[command(name = "xhttp-client")]
#[command(about = "Tunnel local TCP connections over HTTP exchanges", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "xhttp.toml")]
    config: PathBuf,

    /// Override the configured transport (split or duplex).
    #[arg(short, long)]
    transport: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    logging::init(&config.observability.log_level);

    if let Some(transport) = cli.transport.as_deref() {
        config.server.transport = match transport {
            "split" => TransportKind::Split,
            "duplex" => TransportKind::Duplex,
            other => return Err(format!("unknown transport '{}'", other).into()),
        };
    }

    tracing::info!(
        config = ?cli.config,
        server = %config.server.address,
        transport = config.server.transport.as_str(),
        "xhttp-client v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let tunnel = Tunnel::from_config(&config)?;
    let listener = Listener::bind(&config.listener).await?;
    let forwarder = Forwarder::new(tunnel);
    let shutdown = Arc::new(Shutdown::new());

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.trigger();
        });
    }

    forwarder.run(listener, &shutdown).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
