//! Command execution handlers

use anyhow::{Context, Result};
use lidar_core::LidarConfig;

use crate::client::LidarClient;
use crate::format::format_success;

use super::commands::*;

/// Handle info command
pub async fn handle_info(client: &LidarClient, format: &OutputFormat) -> Result<()> {
    let info = client.get_info().await?;
    println!("{}", crate::format::format_info(&info, &format.into())?);
    Ok(())
}

/// Handle status command
pub async fn handle_status(client: &LidarClient, format: &OutputFormat) -> Result<()> {
    let status = client.get_status().await?;
    println!("{}", crate::format::format_status(&status, &format.into())?);
    Ok(())
}

/// Handle start command
pub async fn handle_start(client: &LidarClient, format: &OutputFormat) -> Result<()> {
    let status = client.start().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Table => println!(
            "{}",
            format_success(&format!(
                "LiDAR running on {} ({} RPM target)",
                status.config.serial_port, status.config.motor_rpm_target
            ))
        ),
    }

    Ok(())
}

/// Handle stop command
pub async fn handle_stop(client: &LidarClient, format: &OutputFormat) -> Result<()> {
    let status = client.stop().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Table => println!("{}", format_success("LiDAR stopped")),
    }

    Ok(())
}

/// Handle reset command
pub async fn handle_reset(client: &LidarClient, format: &OutputFormat) -> Result<()> {
    let status = client.reset().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Table => println!("{}", format_success("Fault cleared, LiDAR idle")),
    }

    Ok(())
}

/// Handle config commands
pub async fn handle_config(
    client: &LidarClient,
    command: ConfigCommands,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = client.get_config().await?;
            println!("{}", crate::format::format_config(&config, &format.into())?);
        }
        ConfigCommands::Set { key, value } => {
            let mut config = client.get_config().await?;
            apply_setting(&mut config, &key, &value)?;
            let applied = client.set_config(&config).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&applied)?),
                OutputFormat::Table => {
                    println!("{}", format_success(&format!("Set {} = {}", key, value)))
                }
            }
        }
    }

    Ok(())
}

/// Apply a single `key = value` change to a hardware configuration.
///
/// Only parses; range checks happen on the server.
pub fn apply_setting(config: &mut LidarConfig, key: &str, value: &str) -> Result<()> {
    let invalid = || format!("Invalid value for {}: '{}'", key, value);

    match key {
        "serial_port" => config.serial_port = value.to_string(),
        "baud_rate" => config.baud_rate = value.parse().with_context(invalid)?,
        "pwm_duty" => config.pwm_duty = value.parse().with_context(invalid)?,
        "motor_rpm_target" => config.motor_rpm_target = value.parse().with_context(invalid)?,
        "rpm_tolerance" => config.rpm_tolerance = value.parse().with_context(invalid)?,
        "stabilization_timeout_ms" => {
            config.stabilization_timeout_ms = value.parse().with_context(invalid)?
        }
        "stable_rotations" => config.stable_rotations = value.parse().with_context(invalid)?,
        "read_timeout_ms" => config.read_timeout_ms = value.parse().with_context(invalid)?,
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown configuration key '{}'. Valid keys: serial_port, baud_rate, \
                 pwm_duty, motor_rpm_target, rpm_tolerance, stabilization_timeout_ms, \
                 stable_rotations, read_timeout_ms",
                key
            ));
        }
    }

    Ok(())
}

/// Handle scan commands
pub async fn handle_scan(
    client: &LidarClient,
    command: ScanCommands,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        ScanCommands::Latest { points } => {
            let scan = client.latest_scan().await?;
            println!(
                "{}",
                crate::format::format_scan(&scan, points, &format.into())?
            );
        }
    }

    Ok(())
}

/// Generate shell completion script
pub fn generate_completion(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}
