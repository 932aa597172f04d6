use crate::error::GatewayError;
use crate::mqtt::config::{valid_client_id, MqttConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml;
use tracing::{debug, info};

const CONFIG_DIR: &str = "sensor-gateway";
const CONFIG_FILE: &str = "gateway.toml";

pub const DEFAULT_INTROSPECTION_TOPIC: &str = "Topic";
pub const SERIALDUMP_LINUX: &str = "/home/user/contiki/tools/sky/serialdump-linux";
pub const SERIALDUMP_WINDOWS: &str = "/home/user/contiki/tools/sky/serialdump-windows.exe";

/// Complete gateway configuration, one section per concern
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub broker: MqttConfig,
    pub interest: InterestConfig,
    pub serial: SerialConfig,
}

/// Interest tracking and reconciliation settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InterestConfig {
    /// Topic subscribers announce their topic list on
    pub introspection_topic: String,
    /// Seconds between two reconciliation cycles
    pub diff_interval_secs: u64,
    /// Re-announce every relayed reading on `<introspection_topic>/echo`
    pub echo_readings: bool,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            introspection_topic: DEFAULT_INTROSPECTION_TOPIC.to_string(),
            diff_interval_secs: 30,
            echo_readings: false,
        }
    }
}

impl InterestConfig {
    pub fn diff_interval(&self) -> Duration {
        Duration::from_secs(self.diff_interval_secs)
    }
}

/// Serialdump helper used to attach to the sensor network
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    pub serialdump_linux: PathBuf,
    pub serialdump_windows: PathBuf,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            serialdump_linux: PathBuf::from(SERIALDUMP_LINUX),
            serialdump_windows: PathBuf::from(SERIALDUMP_WINDOWS),
            baud_rate: 115_200,
        }
    }
}

impl Config {
    /// `<config dir>/sensor-gateway/gateway.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads the configuration
    ///
    /// An explicit path must exist. Without one the default location is tried
    /// and a missing file falls back to defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, GatewayError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => {
                    info!("No configuration directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let exists = tokio::fs::try_exists(&path).await.map_err(|e| {
            GatewayError::Config(format!("Failed to check {}: {}", path.display(), e))
        })?;
        if !exists {
            if required {
                return Err(GatewayError::Config(format!(
                    "Configuration file {} does not exist",
                    path.display()
                )));
            }
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, GatewayError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if !valid_client_id(&self.broker.client_id) {
            return Err(GatewayError::Config(format!(
                "broker.client_id '{}' must not be empty or start with a space",
                self.broker.client_id
            )));
        }
        if self.interest.diff_interval_secs == 0 {
            return Err(GatewayError::Config(
                "interest.diff_interval_secs must be greater than 0".to_string(),
            ));
        }
        let topic = &self.interest.introspection_topic;
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(GatewayError::Config(format!(
                "interest.introspection_topic '{}' must be a plain topic name",
                topic
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [broker]
            host = "10.0.0.5"
            reconnect_attempts = 3

            [interest]
            diff_interval_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.host, "10.0.0.5");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.reconnect_attempts, 3);
        assert_eq!(config.interest.diff_interval(), Duration::from_secs(10));
        assert_eq!(config.interest.introspection_topic, "Topic");
        assert!(!config.interest.echo_readings);
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = Config::from_toml("[interest]\ndiff_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = Config::from_toml("[interest]\nintrospection_topic = \"Topic/#\"\n").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = Config::from_toml("[broker]\nclient_id = \"\"\n").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = Config::from_toml("[broker]\nclient_id = \" gw\"\n").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = Config::from_toml("[broker\n").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("sensor-gateway-does-not-exist.toml");
        let err = Config::load(Some(&path)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("sensor-gateway-{}.toml", std::process::id()));
        tokio::fs::write(&path, "[interest]\necho_readings = true\n")
            .await
            .unwrap();

        let config = Config::load(Some(&path)).await.unwrap();
        assert!(config.interest.echo_readings);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
