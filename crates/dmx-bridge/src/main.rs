use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use dmx_bridge::bridge;
use dmx_bridge::config::{self, BridgeConfig};

#[derive(Parser, Debug)]
#[command(name = "dmx-bridge", about = "Art-Net to uDMX bridge")]
struct Args {
    /// Path to the configuration file (.toml, .json, .yml, .yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Configuration could not be loaded or was rejected.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match config::load_config(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config: {}", e);
                return ExitCode::from(EXIT_CONFIG);
            }
        },
        None => {
            info!("No config file given, using defaults");
            BridgeConfig::default()
        }
    };

    info!(
        vid = format!("{:04x}", config.udmx.vendor_id),
        pid = format!("{:04x}", config.udmx.device_id),
        port = config.artnet.port,
        universe = config.artnet.universe,
        "dmx-bridge starting"
    );

    let driver = dmx_device::create_driver(config.udmx.vendor_id, config.udmx.device_id);

    match bridge::run(config, Arc::from(driver)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Bridge error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
