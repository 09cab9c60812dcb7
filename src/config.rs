//! Bridge configuration loaded from TOML
//!
//! Configuration is read once at startup, validated, and then treated as
//! immutable. Secrets are never stored in the file: the file names the
//! environment variables that hold them and they are resolved at runtime.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Number of bridge ticks per configured minute of poll wait (5s ticks)
pub const TICKS_PER_MINUTE: u64 = 12;

/// Fixed interval between two iterations of the running loop
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub vehicle_api: VehicleApiSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub status: StatusSection,
}

/// Vendor telemetry account settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleApiSection {
    /// Account user name (usually an email address)
    pub username: String,
    /// Environment variable containing the account password
    pub password_env: String,
    /// Account region
    #[serde(default)]
    pub region: Region,
    /// Base URL of the telemetry API
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_api_timeout() -> u64 {
    30
}

/// Vendor account regions
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    /// North America
    Mnao,
    /// Europe
    #[default]
    Mme,
    /// Japan
    Mjo,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Mnao => "MNAO",
            Region::Mme => "MME",
            Region::Mjo => "MJO",
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Base topic for all published data and inbound commands
    #[serde(default = "default_topic")]
    pub topic: String,
    /// MQTT client identifier
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl MqttSection {
    /// Broker username from the environment, if configured and set
    pub fn get_username(&self) -> Option<String> {
        get_env_var_optional(self.username_env.as_deref())
    }

    /// Broker password from the environment, if configured and set
    pub fn get_password(&self) -> Option<String> {
        get_env_var_optional(self.password_env.as_deref())
    }
}

fn get_env_var_optional(env_var_name: Option<&str>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

fn default_topic() -> String {
    "mz2mqtt".to_string()
}

fn default_client_name() -> String {
    "mz2mqtt".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

/// Polling cadence settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSection {
    /// Minutes between scheduled full-fleet polls
    #[serde(default = "default_wait")]
    pub wait: u64,
    /// Minutes to wait after a refresh request before reading status
    #[serde(default = "default_refresh_wait")]
    pub refresh_wait: u64,
    /// Maximum nesting depth accepted when flattening a status record
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_wait() -> u64 {
    30
}

fn default_refresh_wait() -> u64 {
    2
}

fn default_max_depth() -> usize {
    32
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            wait: default_wait(),
            refresh_wait: default_refresh_wait(),
            max_depth: default_max_depth(),
        }
    }
}

impl StatusSection {
    /// Ticks between two scheduled polls
    pub fn full_cycle_ticks(&self) -> u64 {
        self.wait.saturating_mul(TICKS_PER_MINUTE)
    }

    /// Wait applied after each refresh request
    pub fn settle_duration(&self) -> Duration {
        Duration::from_secs(self.refresh_wait.saturating_mul(60))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid base topic: {0}")]
    InvalidTopic(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vehicle_api.username.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "vehicle_api.username must not be empty".to_string(),
            ));
        }

        Url::parse(&self.vehicle_api.base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "vehicle_api.base_url '{}' is not a valid URL: {e}",
                self.vehicle_api.base_url
            ))
        })?;

        let broker = Url::parse(&self.mqtt.broker_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "mqtt.broker_url '{}' is not a valid URL: {e}",
                self.mqtt.broker_url
            ))
        })?;
        if !matches!(broker.scheme(), "mqtt" | "mqtts" | "tcp") {
            return Err(ConfigError::InvalidConfig(format!(
                "unsupported broker scheme '{}'",
                broker.scheme()
            )));
        }

        validate_base_topic(&self.mqtt.topic)?;

        if self.mqtt.client_name.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.client_name must not be empty".to_string(),
            ));
        }

        if self.status.max_depth == 0 {
            return Err(ConfigError::InvalidConfig(
                "status.max_depth must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get vendor account password from environment variable
    pub fn get_vehicle_api_password(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.vehicle_api.password_env)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[vehicle_api]
username = "driver@example.com"
password_env = "MZ_TEST_PASSWORD"
base_url = "http://localhost:9000/api"

[mqtt]
broker_url = "mqtt://localhost:1883"
topic = "base"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// A base topic is a plain prefix: no wildcards, no empty levels at the edges
fn validate_base_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(ConfigError::InvalidTopic("topic must not be empty".to_string()));
    }
    if topic.contains('#') || topic.contains('+') {
        return Err(ConfigError::InvalidTopic(format!(
            "'{topic}' must not contain MQTT wildcards"
        )));
    }
    if topic.starts_with('/') || topic.ends_with('/') {
        return Err(ConfigError::InvalidTopic(format!(
            "'{topic}' must not start or end with '/'"
        )));
    }
    Ok(())
}
