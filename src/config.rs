//! Configuration for capsule-vault

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Platform data dir, `./capsule-vault` as a last resort
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capsule-vault")
}

/// Service configuration, loaded from TOML with per-field defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the capsule database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Seconds between readiness sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// IPFS API URL for the content store; unset means the in-memory store
    #[serde(default)]
    pub ipfs_api_url: Option<String>,

    /// Request timeout for content-store calls, in seconds
    #[serde(default = "default_content_store_timeout")]
    pub content_store_timeout_secs: u64,
}

fn default_http_port() -> u16 {
    8094
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_content_store_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            sweep_interval_secs: default_sweep_interval(),
            ipfs_api_url: None,
            content_store_timeout_secs: default_content_store_timeout(),
        }
    }
}

impl Config {
    /// Read the config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Write the config back out as TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// The config file lives next to the database
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.http_port = 9999;
        config.ipfs_api_url = Some("http://127.0.0.1:5001".into());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.http_port, 9999);
        assert_eq!(loaded.ipfs_api_url.as_deref(), Some("http://127.0.0.1:5001"));
        assert_eq!(loaded.sweep_interval_secs, 60);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = toml::from_str("http_port = 8000").unwrap();
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.sweep_interval_secs, 60);
        assert!(config.ipfs_api_url.is_none());
    }
}
