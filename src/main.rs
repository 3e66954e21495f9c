//! DataBear Binary Entry Point
//!
//! Runs a data logger from a YAML configuration, or sends a single control
//! command to a running one. Core functionality is provided by the
//! `databear` library crate.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use databear::{
    config::{AppConfig, DEFAULT_CONTROL_PORT},
    control::{ControlClient, ControlEndpoint},
    logger::{Logger, check_configuration},
    sensor::TcpPortDriver,
    storage::open_writer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// DataBear - Field Telemetry Collector
#[derive(Parser, Debug)]
#[command(name = "databear", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the data logger
    Run {
        /// Path to configuration file
        #[arg(
            short,
            long,
            default_value = "configs/databear.yaml",
            env = "DATABEAR_CONFIG"
        )]
        config: String,

        /// Output file (overrides config file)
        #[arg(long, env = "DATABEAR_OUTPUT")]
        output: Option<std::path::PathBuf>,

        /// Control port (overrides config file)
        #[arg(long, env = "DATABEAR_CONTROL_PORT")]
        control_port: Option<u16>,
    },

    /// Validate a configuration file and exit
    Check {
        /// Path to configuration file
        #[arg(
            short,
            long,
            default_value = "configs/databear.yaml",
            env = "DATABEAR_CONFIG"
        )]
        config: String,
    },

    /// Send a control command to a running logger
    Send {
        /// Command: status, getdata, stop or shutdown
        command: String,

        /// Sensor name for getdata and stop
        arg: Option<String>,

        /// Control endpoint address
        #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_CONTROL_PORT)))]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,databear=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            output,
            control_port,
        } => {
            tracing::info!("DataBear - Field Telemetry Collector");
            tracing::info!(path = %config, "Loading configuration");
            let mut config = AppConfig::load(&config)?;

            // Apply CLI/env overrides (CLI > ENV > config file)
            if let Some(path) = output {
                config.output.path = path;
            }
            if let Some(port) = control_port {
                config.control.port = port;
            }
            config.validate()?;
            run(config).await
        }
        Command::Check { config } => {
            let config = AppConfig::load(&config)?;
            let jobs = check_configuration(&config).await?;
            println!(
                "{}: {} sensors, {} logging rules, {} jobs",
                config.logger.name,
                config.sensors.len(),
                config.datalogger.settings.len(),
                jobs.len()
            );
            for job in jobs {
                println!("  every {}: {}", humantime::format_duration(job.interval), job.task);
            }
            Ok(())
        }
        Command::Send { command, arg, addr } => {
            let response = ControlClient::new(addr)
                .send(&command, arg.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        output = %config.output.path.display(),
        kind = %config.output.kind,
        control = %format!("{}:{}", config.control.bind, config.control.port),
        "Starting logger"
    );

    let writer = open_writer(&config.output).await?;
    let driver = TcpPortDriver::new(config.ports.clone());

    let mut logger = Logger::new(writer)
        .with_driver(Arc::new(driver))
        .with_window_lookback(config.window_lookback);
    logger.load_configuration(&config).await?;

    let endpoint = ControlEndpoint::bind(config.control.addr()?).await?;
    tracing::info!("Press Ctrl+C or send 'shutdown' to stop");
    logger.run(Some(endpoint)).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
