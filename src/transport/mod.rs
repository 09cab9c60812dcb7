//! Broker transport abstraction
//!
//! The bridge loop talks to the broker only through [`Transport`], so tests
//! can substitute a recording mock for the rumqttc client.

use crate::bridge::channel::CommandSender;

pub mod mqtt;

pub use mqtt::ConnectionState;

/// Transport trait for publishing status and receiving commands
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker and start the delivery context
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Stop the delivery context and disconnect
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to the command filter `<base>/SET/#`
    async fn subscribe_to_commands(&mut self) -> Result<(), Self::Error>;

    /// Publish one payload at QoS 0
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> Option<ConnectionState>;

    /// Set the sender that received commands are queued on
    fn set_command_sender(&self, sender: CommandSender);
}
