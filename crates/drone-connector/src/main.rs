//! drone-node: run one drone on the UDP broadcast medium.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use drone_connector::{DroneConfig, DroneController};
use drone_network::UdpBroadcastTransport;
use drone_protocol::DroneId;

#[derive(Parser, Debug)]
#[command(name = "drone-node", version, about = "Self-organizing drone swarm node")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed drone id (1-65535). A random id is drawn when omitted.
    #[arg(long)]
    id: Option<DroneId>,

    /// Local address to receive broadcasts on.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Address outgoing datagrams are sent to.
    #[arg(long)]
    broadcast: Option<SocketAddr>,

    /// Multiplier applied to every protocol interval and timeout.
    #[arg(long)]
    time_scale: Option<f64>,

    /// Starting battery level (0-100).
    #[arg(long)]
    battery: Option<f64>,

    /// Print the final network snapshot as JSON on shutdown.
    #[arg(long)]
    snapshot: bool,

    /// Debug-level logging. Overridden by RUST_LOG.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

fn build_config(cli: &Cli) -> anyhow::Result<DroneConfig> {
    let mut config = DroneConfig::load(cli.config.as_deref())?;
    if let Some(id) = cli.id {
        config.node.id = Some(id);
    }
    if let Some(battery) = cli.battery {
        config.node.battery_level = battery;
    }
    if let Some(bind) = cli.bind {
        config.network.bind_addr = bind;
    }
    if let Some(broadcast) = cli.broadcast {
        config.network.broadcast_addr = broadcast;
    }
    if let Some(scale) = cli.time_scale {
        config.timing.time_scale = scale;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli)?;
    let transport = UdpBroadcastTransport::bind(config.network.transport_config())
        .with_context(|| format!("Failed to bind {}", config.network.bind_addr))?;

    let mut controller = DroneController::from_config(&config, transport, Instant::now());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C; running until killed");
                // Keep the sender alive so the loop is not told to stop.
                std::future::pending::<()>().await;
            }
        }
    });

    controller.run(config.timing.tick(), shutdown_rx).await?;

    if cli.snapshot {
        let snapshot = controller.view().snapshot(Instant::now());
        println!("{}", snapshot.to_json_pretty()?);
    }
    Ok(())
}
