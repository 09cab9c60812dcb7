//! MQTT client built on rumqttc
//!
//! Split into pure and impure parts:
//!
//! - [`connection`] - connection state, errors and option construction
//! - [`message_handler`] - event routing and command forwarding
//! - [`health_monitor`] - state transitions and operation guards
//! - [`client`] - the rumqttc client and its event-loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use mz2mqtt::bridge::channel::CommandChannel;
//! use mz2mqtt::config::MqttSection;
//! use mz2mqtt::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     topic: "mz2mqtt".to_string(),
//!     client_name: "mz2mqtt".to_string(),
//!     keep_alive_secs: 60,
//! };
//!
//! let channel = CommandChannel::new();
//! let mut client = MqttClient::new(&config)?;
//! client.set_command_sender(channel.sender());
//! client.connect().await?;
//! client.subscribe_to_commands().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError};
pub use health_monitor::{ConnectionEvent, HealthMonitor};
pub use message_handler::{EventRoute, MessageForwarder, MessageHandler};
