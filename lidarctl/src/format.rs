//! Output formatting utilities for the CLI
//!
//! Provides table and JSON formatting with colors.

use anyhow::Result;
use colored::*;
use lidar_core::api::{InfoResponse, StatusResponse};
use lidar_core::{LidarConfig, Scan};

use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Format info response
pub fn format_info(info: &InfoResponse, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(info)?),
        OutputFormat::Table => {
            let mut output = String::new();
            output.push_str(&"LiDAR Server Information".bold().to_string());
            output.push('\n');
            output.push_str(&format!("Version: {}", info.version.cyan()));
            output.push('\n');
            output.push_str(&format!(
                "Hardware: {}",
                if info.hardware_mode == "mock" {
                    info.hardware_mode.yellow()
                } else {
                    info.hardware_mode.green()
                }
            ));
            output.push('\n');
            output.push_str(&format!(
                "Uptime: {} seconds",
                info.uptime.to_string().yellow()
            ));
            output.push('\n');
            output.push_str(&format!(
                "Stream queue: {} scans per subscriber ({:?})",
                info.subscriber_capacity, info.overflow_policy
            ));
            Ok(output)
        }
    }
}

fn colored_state(state: &str) -> ColoredString {
    match state {
        "running" => state.green().bold(),
        "starting" | "stopping" => state.yellow(),
        "error" => state.red().bold(),
        _ => state.normal(),
    }
}

/// Format status response
pub fn format_status(status: &StatusResponse, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(status)?),
        OutputFormat::Table => {
            let mut output = String::new();
            output.push_str(&"LiDAR Status".bold().to_string());
            output.push('\n');
            output.push_str(&format!("State: {}", colored_state(&status.state)));
            if let Some(fault) = &status.fault {
                output.push('\n');
                output.push_str(&format!(
                    "Fault: {} - {}",
                    fault.reason.red(),
                    fault.message
                ));
            }
            output.push('\n');
            output.push_str(&format!(
                "Device: {} @ {} baud",
                status.config.serial_port.cyan(),
                status.config.baud_rate
            ));
            output.push('\n');
            output.push_str(&format!("Subscribers: {}", status.subscriber_count));
            output.push('\n');
            output.push_str(&format!("Scans published: {}", status.scans_published));
            output.push('\n');
            let malformed = status.malformed_sample_count.to_string();
            output.push_str(&format!(
                "Malformed samples: {}",
                if status.malformed_sample_count > 0 {
                    malformed.yellow()
                } else {
                    malformed.normal()
                }
            ));
            output.push('\n');
            output.push_str(&format!("Uptime: {} seconds", status.uptime_secs));
            Ok(output)
        }
    }
}

/// Format hardware configuration
pub fn format_config(config: &LidarConfig, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct ConfigRow {
                #[tabled(rename = "Setting")]
                key: &'static str,
                #[tabled(rename = "Value")]
                value: String,
            }

            let rows = vec![
                ConfigRow {
                    key: "serial_port",
                    value: config.serial_port.clone(),
                },
                ConfigRow {
                    key: "baud_rate",
                    value: config.baud_rate.to_string(),
                },
                ConfigRow {
                    key: "pwm_duty",
                    value: config.pwm_duty.to_string(),
                },
                ConfigRow {
                    key: "motor_rpm_target",
                    value: config.motor_rpm_target.to_string(),
                },
                ConfigRow {
                    key: "rpm_tolerance",
                    value: format!("{:.0}%", config.rpm_tolerance * 100.0),
                },
                ConfigRow {
                    key: "stabilization_timeout_ms",
                    value: config.stabilization_timeout_ms.to_string(),
                },
                ConfigRow {
                    key: "stable_rotations",
                    value: config.stable_rotations.to_string(),
                },
                ConfigRow {
                    key: "read_timeout_ms",
                    value: config.read_timeout_ms.to_string(),
                },
            ];

            let table = Table::new(rows).with(Style::rounded()).to_string();
            Ok(format!("{}\n{}", "LiDAR Configuration:".bold(), table))
        }
    }
}

/// Distance statistics over the samples that produced a return
struct ScanSummary {
    returns: usize,
    min: f32,
    max: f32,
    mean: f32,
}

fn summarize(scan: &Scan) -> Option<ScanSummary> {
    let distances: Vec<f32> = scan
        .points()
        .iter()
        .filter(|p| p.has_return())
        .map(|p| p.distance)
        .collect();
    if distances.is_empty() {
        return None;
    }

    let min = distances.iter().copied().fold(f32::INFINITY, f32::min);
    let max = distances.iter().copied().fold(0.0, f32::max);
    let mean = distances.iter().sum::<f32>() / distances.len() as f32;
    Some(ScanSummary {
        returns: distances.len(),
        min,
        max,
        mean,
    })
}

/// Format a scan summary, optionally followed by every point
pub fn format_scan(scan: &Scan, show_points: bool, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            if show_points {
                Ok(serde_json::to_string_pretty(scan)?)
            } else {
                let summary = summarize(scan);
                Ok(serde_json::to_string_pretty(&serde_json::json!({
                    "timestamp": scan.timestamp(),
                    "point_count": scan.len(),
                    "return_count": summary.as_ref().map_or(0, |s| s.returns),
                    "min_distance": summary.as_ref().map(|s| s.min),
                    "max_distance": summary.as_ref().map(|s| s.max),
                    "mean_distance": summary.as_ref().map(|s| s.mean),
                }))?)
            }
        }
        OutputFormat::Table => {
            let mut output = String::new();
            output.push_str(&"Latest Scan".bold().to_string());
            output.push('\n');
            output.push_str(&format!("Timestamp: {:.3}", scan.timestamp()));
            output.push('\n');
            output.push_str(&format!("Points: {}", scan.len().to_string().cyan()));
            match summarize(scan) {
                Some(summary) => {
                    output.push('\n');
                    output.push_str(&format!("Returns: {}", summary.returns));
                    output.push('\n');
                    output.push_str(&format!(
                        "Distance (mm): min {:.1}, max {:.1}, mean {:.1}",
                        summary.min, summary.max, summary.mean
                    ));
                }
                None => {
                    output.push('\n');
                    output.push_str(&"No returns in this scan".dimmed().to_string());
                }
            }

            if show_points {
                #[derive(Tabled)]
                struct PointRow {
                    #[tabled(rename = "Angle (°)")]
                    angle: String,
                    #[tabled(rename = "Distance (mm)")]
                    distance: String,
                    #[tabled(rename = "Intensity")]
                    intensity: u8,
                }

                let rows: Vec<PointRow> = scan
                    .points()
                    .iter()
                    .map(|p| PointRow {
                        angle: format!("{:.2}", p.angle),
                        distance: if p.has_return() {
                            format!("{:.1}", p.distance)
                        } else {
                            "-".dimmed().to_string()
                        },
                        intensity: p.intensity,
                    })
                    .collect();

                output.push('\n');
                output.push_str(&Table::new(rows).with(Style::rounded()).to_string());
            }

            Ok(output)
        }
    }
}

/// Format success message
pub fn format_success(message: &str) -> String {
    format!("{} {}", "✓".green().bold(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lidar_core::api::FaultInfo;
    use lidar_core::{OverflowPolicy, Sample};

    fn scan() -> Scan {
        Scan::with_timestamp(
            1700000000.5,
            vec![
                Sample::new(0.0, 1000.0, 40),
                Sample::new(90.0, 0.0, 0),
                Sample::new(180.0, 3000.0, 47),
            ],
        )
    }

    #[test]
    fn test_format_success() {
        let message = format_success("Operation completed");
        assert!(message.contains("✓"));
        assert!(message.contains("Operation completed"));
    }

    #[test]
    fn test_format_info_json() {
        let info = InfoResponse {
            version: "0.1.0".to_string(),
            hardware_mode: "serial".to_string(),
            uptime: 3600,
            subscriber_capacity: 10,
            overflow_policy: OverflowPolicy::DropNewest,
        };

        let result = format_info(&info, &OutputFormat::Json).unwrap();
        assert!(result.contains("\"hardware_mode\": \"serial\""));
        assert!(result.contains("drop_newest"));
    }

    #[test]
    fn test_format_status_table_shows_fault() {
        colored::control::set_override(false);
        let status = StatusResponse {
            state: "error".to_string(),
            fault: Some(FaultInfo {
                reason: "HardwareFault".to_string(),
                message: "Hardware fault: EOF".to_string(),
            }),
            config: LidarConfig::default(),
            subscriber_count: 1,
            malformed_sample_count: 3,
            scans_published: 12,
            uptime_secs: 60,
        };

        let result = format_status(&status, &OutputFormat::Table).unwrap();
        assert!(result.contains("State: error"));
        assert!(result.contains("Fault: HardwareFault - Hardware fault: EOF"));
        assert!(result.contains("Malformed samples: 3"));
    }

    #[test]
    fn test_format_config_table() {
        let result = format_config(&LidarConfig::default(), &OutputFormat::Table).unwrap();
        assert!(result.contains("motor_rpm_target"));
        assert!(result.contains("/dev/ttyUSB0"));
        assert!(result.contains("10%"));
    }

    #[test]
    fn test_format_scan_summary_json() {
        let result = format_scan(&scan(), false, &OutputFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(json["point_count"], 3);
        assert_eq!(json["return_count"], 2);
        assert_eq!(json["min_distance"], 1000.0);
        assert_eq!(json["max_distance"], 3000.0);
        assert_eq!(json["mean_distance"], 2000.0);
    }

    #[test]
    fn test_format_scan_points_json() {
        let result = format_scan(&scan(), true, &OutputFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(json["points"].as_array().unwrap().len(), 3);
        assert_eq!(json["points"][2]["intensity"], 47);
    }

    #[test]
    fn test_format_scan_without_returns() {
        colored::control::set_override(false);
        let empty = Scan::with_timestamp(1.0, vec![Sample::new(10.0, 0.0, 0)]);
        let result = format_scan(&empty, true, &OutputFormat::Table).unwrap();
        assert!(result.contains("No returns in this scan"));
        assert!(result.contains("10.00"));
    }
}
