//! Airnut Service - foreground runner for the device socket server.
//!
//! Run with: `cargo run -p airnut-service`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::interval;
use tracing::{debug, info};

use airnut_core::AirnutServer;
use airnut_service::Config;

/// Airnut Service - TCP listener for Airnut 1S air-quality sensors.
#[derive(Parser, Debug)]
#[command(name = "airnut-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Scan interval in seconds (overrides config).
    #[arg(short, long)]
    scan_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airnut_core=info".parse()?)
                .add_directive("airnut_service=info".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(scan_interval) = args.scan_interval {
        config.server.scan_interval = scan_interval;
    }

    let server = AirnutServer::new(config.server)?;
    server.start().await?;

    // Poll the scheduling façade the way a host entity layer would before
    // each value read; the server decides whether a broadcast is due.
    let poller = tokio::spawn(poll_loop(
        Arc::clone(&server),
        Duration::from_secs(config.host.poll_interval),
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    poller.abort();
    server.stop().await;
    Ok(())
}

async fn poll_loop(server: Arc<AirnutServer>, poll_interval: Duration) {
    let mut ticker = interval(poll_interval);
    loop {
        ticker.tick().await;
        server.update_device_data().await;
        for (device_ip, reading) in server.readings().await {
            debug!(
                "{}: t={:?} h={:?} pm25={:?} co2={:?}",
                device_ip, reading.temperature, reading.humidity, reading.pm25, reading.co2
            );
        }
    }
}
