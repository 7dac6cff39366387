//! Default path resolution for configuration files
//!
//! Uses XDG Base Directory specification when available, with sensible fallbacks.

use std::path::PathBuf;

/// Returns the default path for the daemon configuration file.
///
/// Uses XDG config directory if available:
/// - Linux/macOS: `~/.config/lidar/config.toml`
/// - Fallback: `/etc/lidar/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("lidar")
        .join("config.toml")
}

/// Returns the default path for the CLI configuration file.
pub fn default_cli_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("lidar")
        .join("cli.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        assert!(path.ends_with("lidar/config.toml"));
    }

    #[test]
    fn test_default_cli_config_path() {
        assert!(default_cli_config_path().ends_with("lidar/cli.toml"));
    }
}
