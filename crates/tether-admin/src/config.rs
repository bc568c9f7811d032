//! Configuration loading from `~/.tether/config.toml` with defaults.
//!
//! The `RSA_PORT` environment variable overrides the configured listen port.

use std::path::{Path, PathBuf};
use tether_types::config::TetherConfig;
use tracing::{info, warn};

/// Environment variable overriding `[http] port`.
pub const PORT_ENV_VAR: &str = "RSA_PORT";

/// Load configuration from a TOML file, falling back to defaults, then apply
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> TetherConfig {
    let mut config = load_config_file(path);
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn load_config_file(path: Option<&Path>) -> TetherConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return TetherConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<TetherConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                TetherConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            TetherConfig::default()
        }
    }
}

/// Apply environment overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut TetherConfig, lookup: impl Fn(&str) -> Option<String>) {
    let Some(raw) = lookup(PORT_ENV_VAR) else {
        return;
    };
    match raw.trim().parse::<u16>() {
        Ok(port) => {
            info!(port, "Listen port overridden by {PORT_ENV_VAR}");
            config.http.port = port;
        }
        Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {PORT_ENV_VAR}"),
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    tether_home().join("config.toml")
}

/// Get the default Tether home directory.
pub fn tether_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".tether")
}
