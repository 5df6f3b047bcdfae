mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::policy::{ChannelArgs, ServerAddress};

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub channel: ChannelConfig,
    /// LB config list in the `[{policy_name: config}, ...]` shape
    #[serde(default = "default_load_balancing_config")]
    pub load_balancing_config: serde_json::Value,
    /// Backend addresses as `host:port` strings
    pub addresses: Vec<String>,
    /// Number of picks `run` performs
    #[serde(default = "default_picks")]
    pub picks: usize,
}

/// Logical connection the policy is attached to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default)]
    pub args: HashMap<String, String>,
}

fn default_authority() -> String {
    "localhost".to_string()
}

fn default_load_balancing_config() -> serde_json::Value {
    serde_json::json!([{ "imbalancer": {} }])
}

fn default_picks() -> usize {
    5
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            args: HashMap::new(),
        }
    }
}

impl ChannelConfig {
    pub fn channel_args(&self) -> ChannelArgs {
        ChannelArgs::from(self.args.clone())
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration with fallback to default path
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                Err(ConfigError::NotFound(
                    "No config file found. Tried: config.yaml, config.yml, ./config/config.yaml"
                        .to_string(),
                ))
            }
        }
    }

    /// Check the parts of the config the registry does not look at
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.load_balancing_config.is_array() {
            return Err(ConfigError::Validation(
                "load_balancing_config must be a list".to_string(),
            ));
        }
        if self.channel.authority.trim().is_empty() {
            return Err(ConfigError::Validation(
                "channel.authority must not be empty".to_string(),
            ));
        }
        self.server_addresses().map(|_| ())
    }

    /// Parsed backend addresses, in config order
    pub fn server_addresses(&self) -> Result<Vec<ServerAddress>, ConfigError> {
        self.addresses
            .iter()
            .map(|raw| {
                raw.parse().map_err(|e| {
                    ConfigError::Validation(format!("invalid address '{raw}': {e}"))
                })
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
