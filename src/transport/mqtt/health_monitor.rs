//! Pure connection health logic for the MQTT client
//!
//! State transitions and operation guards. The bridge never reconnects: any
//! loss of the broker ends in `Disconnected` and the bridge loop shuts down.

use super::connection::ConnectionState;
use tracing::{error, info, warn};

/// Connection lifecycle events observed by the event-loop task
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    ConnAckReceived,
    DisconnectedByBroker,
    NetworkError(String),
    ClientDisconnected,
}

/// Pure health decisions
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => ConnectionState::Disconnected(error),
            ConnectionEvent::ClientDisconnected => {
                ConnectionState::Disconnected("Client disconnected".to_string())
            }
        }
    }

    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Check if connection state allows subscribing (pure function)
    pub fn can_subscribe(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Log connection state transition
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "MQTT connection lost");
            }
            (ConnectionState::Connecting, ConnectionState::Disconnected(reason)) => {
                error!(reason = %reason, "MQTT connection could not be established");
            }
            _ => {
                info!("MQTT connection state: {} -> {}", from, to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_next_state() {
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::ConnAckReceived),
            ConnectionState::Connected
        );
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::DisconnectedByBroker),
            ConnectionState::Disconnected("Broker disconnected".to_string())
        );
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::NetworkError(
                "connection refused".to_string()
            )),
            ConnectionState::Disconnected("connection refused".to_string())
        );
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::ClientDisconnected),
            ConnectionState::Disconnected("Client disconnected".to_string())
        );
    }

    #[test]
    fn test_can_publish() {
        assert!(HealthMonitor::can_publish(&ConnectionState::Connected));
        assert!(!HealthMonitor::can_publish(&ConnectionState::Connecting));
        assert!(!HealthMonitor::can_publish(&ConnectionState::Disconnected(
            "gone".to_string()
        )));
    }

    #[test]
    fn test_can_subscribe() {
        assert!(HealthMonitor::can_subscribe(&ConnectionState::Connected));
        assert!(!HealthMonitor::can_subscribe(&ConnectionState::Connecting));
    }
}
