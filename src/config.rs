use crate::access_log::DEFAULT_RETENTION_DAYS;
use crate::matcher::DEFAULT_THRESHOLD;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_CONFIG_PATH").unwrap_or("/usr/local/etc/facegate/config.toml"))
});

/// Placeholder secret shipped in the default config; `serve` warns when it
/// is still in use.
pub const PLACEHOLDER_API_KEY: &str = "change-me";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Shared secret every API request must present in `x-api-key`.
    pub api_key: String,
    /// Default match threshold when a request does not supply one.
    pub threshold: f32,
    pub db_path: String,
    pub log_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            threshold: DEFAULT_THRESHOLD,
            db_path: "/var/lib/facegate/facegate.db".to_string(),
            log_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/facegate.toml"))).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.log_retention_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 9000\napi_key = \"secret\"\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.host, "0.0.0.0");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            api_key: "k".to_string(),
            threshold: 0.8,
            ..Config::default()
        };
        save_config(&cfg, Some(&path)).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.api_key, "k");
        assert_eq!(loaded.threshold, 0.8);
    }
}
