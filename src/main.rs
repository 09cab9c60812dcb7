//! mz2mqtt - Main Entry Point
//!
//! Loads the configuration, builds the broker and vendor API clients and
//! hands both to the bridge loop until a signal or a fatal error stops it.

use clap::{Parser, Subcommand};
use mz2mqtt::bridge::{BridgeLoop, BridgeOptions};
use mz2mqtt::config::BridgeConfig;
use mz2mqtt::error::{BridgeError, BridgeResult};
use mz2mqtt::observability::{init_default_logging, init_logging, parse_spans, LogFormat};
use mz2mqtt::transport::mqtt::MqttClient;
use mz2mqtt::vehicle_api::HttpVehicleApi;
use std::env;
use std::path::PathBuf;
use std::process;
use tokio::sync::watch;
use tracing::{error, info, Level};

/// Vehicle telemetry to MQTT bridge
#[derive(Parser)]
#[command(name = "mz2mqtt")]
#[command(about = "Publish connected-vehicle status to an MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until interrupted
    Run,
    /// Validate the configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["mz2mqtt.toml", "config/mz2mqtt.toml", "config.toml"];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
            let spans = parse_spans(&env::var("LOG_SPANS").unwrap_or_default());
            init_logging(level, format, spans);
        }
    }

    info!("Starting mz2mqtt v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Run => run_bridge(config).await.map_err(Into::into),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create mz2mqtt.toml".into())
}

async fn run_bridge(config: BridgeConfig) -> BridgeResult<()> {
    info!(
        broker = %config.mqtt.broker_url,
        topic = %config.mqtt.topic,
        region = config.vehicle_api.region.as_str(),
        "Bridge configuration loaded"
    );

    let mut bridge = build_bridge(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    bridge.execute(shutdown_rx).await
}

/// Build the vendor client and broker client; every failure here is fatal
fn build_bridge(config: &BridgeConfig) -> BridgeResult<BridgeLoop<MqttClient, HttpVehicleApi>> {
    let password = config.get_vehicle_api_password()?;
    let api =
        HttpVehicleApi::new(&config.vehicle_api, password).map_err(BridgeError::startup)?;
    let transport = MqttClient::new(&config.mqtt).map_err(BridgeError::broker_unavailable)?;
    Ok(BridgeLoop::new(transport, api, BridgeOptions::from_config(config)))
}

fn handle_config_command(
    config: &BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Unable to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    }
}
