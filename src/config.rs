use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// US state codes to deny (two-letter ISO codes, any case)
    #[serde(default)]
    pub blocked_states: Vec<String>,

    /// IPs admitted unconditionally (exact string match, not CIDR)
    #[serde(default)]
    pub whitelisted_ips: Vec<String>,

    /// Path prefixes admitted before any IP or geo logic runs
    /// (ACME challenges, health checks)
    #[serde(default)]
    pub whitelisted_paths: Vec<String>,

    /// Path to the MaxMind GeoIP2 database
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Optional HTML template for the denial page; `{{STATE}}` is replaced
    /// with the blocking jurisdiction code
    #[serde(default)]
    pub template_path: Option<String>,

    /// Maximum number of per-IP verdicts to cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Listen address for the standalone server
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocked_states: Vec::new(),
            whitelisted_ips: Vec::new(),
            whitelisted_paths: Vec::new(),
            db_path: default_db_path(),
            template_path: None,
            cache_capacity: default_cache_capacity(),
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/stategate/config.toml"),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Get the database path
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }
}

// Default value functions
fn default_db_path() -> String {
    "/plugins-local/geoip.mmdb".to_string()
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
