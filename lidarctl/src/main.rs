//! LiDAR CLI
//!
//! Command-line interface for controlling the LiDAR daemon.

use anyhow::Result;
use clap::Parser;
use lidarctl::cli::{
    generate_completion, handle_config, handle_info, handle_reset, handle_scan, handle_start,
    handle_status, handle_stop, Cli, Commands, OutputFormat,
};
use lidarctl::client::LidarClient;
use lidarctl::config::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Completion needs no server
    if let Commands::Completion { shell } = cli.command {
        generate_completion(shell);
        return Ok(());
    }

    // Build configuration using priority chain: defaults → file → env → CLI args
    let mut builder = CliConfig::builder();

    if !cli.no_config {
        builder = builder.with_config_file(cli.config.as_deref())?;
    }

    builder = builder.with_env_overrides();

    if let Some(ref server) = cli.server {
        builder = builder.with_server_url(server)?;
    }
    if let Some(ref format) = cli.format {
        let format_str = match format {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        };
        builder = builder.with_output_format(format_str)?;
    }
    if let Some(verbose) = cli.verbose {
        builder = builder.with_verbose(verbose);
    }
    if let Some(timeout) = cli.timeout {
        builder = builder.with_timeout(timeout)?;
    }

    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            if cli.verbose.unwrap_or(false) {
                eprintln!("Error details: {:?}", e);
            }
            std::process::exit(1);
        }
    };

    let server_url = &config.server_url;
    let output_format = match config.output_format.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };
    let verbose = config.verbose;

    if verbose {
        eprintln!("Verbose mode enabled");
        eprintln!("Server URL: {}", server_url);
        eprintln!("Output format: {:?}", output_format);
        eprintln!("Timeout: {}s", config.timeout);
    }

    let client = match LidarClient::with_config(
        server_url.clone(),
        config.timeout,
        3,
        std::time::Duration::from_millis(500),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: Cannot connect to LiDAR server at {}", server_url);
            eprintln!("Make sure the server is running and accessible.");
            eprintln!("Connection error: {}", e);
            std::process::exit(1);
        }
    };

    if verbose {
        let info = client.server_info();
        eprintln!(
            "Connected to lidard {} ({} hardware)",
            info.version, info.hardware_mode
        );
    }

    let result = match cli.command {
        Commands::Info => handle_info(&client, &output_format).await,
        Commands::Status => handle_status(&client, &output_format).await,
        Commands::Start => handle_start(&client, &output_format).await,
        Commands::Stop => handle_stop(&client, &output_format).await,
        Commands::Reset => handle_reset(&client, &output_format).await,
        Commands::Config { command } => handle_config(&client, command, &output_format).await,
        Commands::Scan { command } => handle_scan(&client, command, &output_format).await,
        Commands::Completion { .. } => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if verbose {
            eprintln!("Error details: {:?}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}
