//! Pure connection state management for the MQTT client
//!
//! Connection states, transport errors and broker option construction.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - waiting for ConnAck
    Connecting,
    /// Connected and ready for operations
    Connected,
    /// Disconnected with reason; the bridge does not reconnect
    Disconnected(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Disconnected(reason) => write!(f, "disconnected ({reason})"),
        }
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Default broker port for a URL scheme
pub fn default_port(scheme: &str) -> u16 {
    if scheme == "mqtts" {
        8883
    } else {
        1883
    }
}

/// Build rumqttc options from the `[mqtt]` section
///
/// The client id is the configured client name; broker credentials are read
/// from the environment variables the section names.
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url.port().unwrap_or_else(|| default_port(url.scheme()));

    let mut mqtt_options = MqttOptions::new(config.client_name.clone(), host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.get_username() {
        let password = config.get_password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            topic: "mz2mqtt".to_string(),
            client_name: "mz2mqtt-test".to_string(),
            keep_alive_secs: 45,
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_mqtt_config()).unwrap();

        assert_eq!(options.client_id(), "mz2mqtt-test");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(45));
    }

    #[test]
    fn test_default_ports() {
        let mut config = test_mqtt_config();
        config.broker_url = "mqtt://broker.local".to_string();
        let options = configure_mqtt_options(&config).unwrap();
        assert_eq!(options.broker_address().1, 1883);

        assert_eq!(default_port("mqtts"), 8883);
        assert_eq!(default_port("tcp"), 1883);
    }

    #[test]
    fn test_credentials_from_environment() {
        let mut config = test_mqtt_config();
        config.username_env = Some("MZ_CONN_TEST_USER".to_string());
        config.password_env = Some("MZ_CONN_TEST_PASS".to_string());
        std::env::set_var("MZ_CONN_TEST_USER", "bridge");
        std::env::set_var("MZ_CONN_TEST_PASS", "hunter2");

        let options = configure_mqtt_options(&config).unwrap();
        assert_eq!(
            options.credentials(),
            Some(("bridge".to_string(), "hunter2".to_string()))
        );

        std::env::remove_var("MZ_CONN_TEST_USER");
        std::env::remove_var("MZ_CONN_TEST_PASS");
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_mqtt_config();
        config.broker_url = "invalid-url".to_string();

        let result = configure_mqtt_options(&config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::Disconnected("broker gone".to_string()).to_string(),
            "disconnected (broker gone)"
        );
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::InvalidBrokerUrl("test".to_string()),
            MqttError::NotConnected {
                state: ConnectionState::Disconnected("test".to_string()),
            },
            MqttError::ConnectionFailedStr("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
