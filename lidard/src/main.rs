//! LiDAR Server
//!
//! Owns a single LiDAR device, assembles its samples into full-rotation
//! scans and fans them out to any number of consumers. Control goes
//! through a REST API; scans are served over REST and a WebSocket stream.
//!
//! # Hardware selection
//!
//! The serial port comes from `[lidar].serial_port` in the config file and
//! can be overridden with `--device`. The value `auto` probes USB serial
//! ports for a known adapter when the device is started. `--mock` replaces
//! the hardware with a simulated sensor.

mod api;
mod config;
mod manager;
mod shutdown;

use anyhow::Result;
use api::AppState;
use clap::Parser;
use lidar_core::default_config_path;
use lidar_hardware::{DriverFactory, SerialDriverFactory, SimulatedFactory};
use manager::LidarManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// LiDAR API Server
#[derive(Parser, Debug)]
#[command(name = "lidard")]
#[command(version, about = "LiDAR management daemon", long_about = None)]
struct Args {
    /// Path to configuration file (.toml, .yaml or .yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server bind address (overrides [server].bind)
    #[arg(short, long)]
    bind: Option<String>,

    /// Server port (overrides [server].port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging, including raw UART traffic
    #[arg(short, long)]
    verbose: bool,

    /// Enable mock mode (simulated sensor, no hardware needed)
    #[arg(long)]
    mock: bool,

    /// Serial device path (e.g., /dev/ttyUSB0), or "auto" to probe
    #[arg(long)]
    device: Option<String>,

    /// Start the device as soon as the server is up
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.verbose);

    info!("LiDAR Server starting...");

    // Determine config path: CLI flag > env var > default
    let config_path = args.config.unwrap_or_else(|| {
        std::env::var("LIDARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    });
    info!("Configuration file: {}", config_path.display());

    let mut static_config = config::load_static_config(&config_path).await?;
    info!("Configuration loaded successfully");

    if let Some(device) = args.device {
        info!("Serial device overridden on command line: {}", device);
        static_config.lidar.serial_port = device;
        if let Err(e) = static_config.lidar.validate() {
            error!("Invalid --device: {}", e);
            std::process::exit(1);
        }
    }

    let bind = args.bind.unwrap_or_else(|| static_config.server.bind.clone());
    let port = args.port.unwrap_or(static_config.server.port);
    let bind_addr = format!("{}:{}", bind, port);

    let factory: Arc<dyn DriverFactory> = if args.mock {
        info!("Mock mode: using simulated LiDAR");
        Arc::new(SimulatedFactory)
    } else {
        info!(
            "Serial mode: {} @ {} baud",
            static_config.lidar.serial_port, static_config.lidar.baud_rate
        );
        Arc::new(SerialDriverFactory::new(args.verbose))
    };

    let manager = Arc::new(LidarManager::new(
        factory,
        static_config.lidar.clone(),
        &static_config.stream,
    ));
    info!(
        "Scan fan-out ready: capacity {} per subscriber, {:?}",
        static_config.stream.subscriber_capacity, static_config.stream.overflow_policy
    );

    if args.autostart {
        let manager = manager.clone();
        tokio::spawn(async move {
            info!("Autostart requested, starting LiDAR...");
            match manager.start().await {
                Ok(()) => info!("LiDAR running"),
                Err(e) => warn!("Autostart failed: {} (state: {})", e, manager.state()),
            }
        });
    }

    let manager_for_shutdown = manager.clone();
    let shutdown_config = static_config.shutdown.clone();

    // Set up API router
    let app = api::create_router(AppState::new(manager));

    // Start server
    info!("Starting server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("LiDAR API Server listening on {}", bind_addr);
    info!("Server ready!");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown::release_lidar(&manager_for_shutdown, &shutdown_config).await;
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
