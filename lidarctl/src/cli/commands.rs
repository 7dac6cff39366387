//! CLI command and subcommand definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// LiDAR CLI
#[derive(Parser, Debug)]
#[command(name = "lidarctl")]
#[command(version, about = "LiDAR management CLI", long_about = None)]
pub struct Cli {
    /// Server URL (overrides config file)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Output format (overrides config file)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging (overrides config file)
    #[arg(short, long)]
    pub verbose: Option<bool>,

    /// Request timeout in seconds (overrides config file)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Don't load config file
    #[arg(long)]
    pub no_config: bool,

    /// Config file path (default: ~/.config/lidar/cli.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty table output
    Table,
    /// JSON output
    Json,
}

impl From<&OutputFormat> for crate::format::OutputFormat {
    fn from(format: &OutputFormat) -> Self {
        match format {
            OutputFormat::Table => crate::format::OutputFormat::Table,
            OutputFormat::Json => crate::format::OutputFormat::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show server information
    Info,

    /// Show device state, counters and active configuration
    Status,

    /// Spin up the motor and start scanning
    Start,

    /// Stop scanning and halt the motor
    Stop,

    /// Clear a fault (error → idle)
    Reset,

    /// Show or replace the hardware configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Scan retrieval commands
    Scan {
        #[command(subcommand)]
        command: ScanCommands,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the active hardware configuration
    Show,

    /// Change one setting; a running device is restarted with it
    Set {
        /// Setting name (e.g. serial_port, pwm_duty, motor_rpm_target)
        key: String,
        /// New value
        value: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScanCommands {
    /// Show the most recent completed scan
    Latest {
        /// List every point instead of a summary
        #[arg(long)]
        points: bool,
    },
}
