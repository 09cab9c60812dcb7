//! Impure I/O operations for the MQTT client
//!
//! Owns the rumqttc client and the background event-loop task. The task is
//! the broker delivery context: it tracks connection state and forwards
//! command publishes into the bridge's command channel, nothing else.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError};
use super::health_monitor::{ConnectionEvent, HealthMonitor};
use super::message_handler::{EventRoute, MessageForwarder, MessageHandler};
use crate::bridge::channel::CommandSender;
use crate::config::MqttSection;
use crate::protocol::TopicBuilder;
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Time allowed for the broker to acknowledge the connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the rumqttc request queue
const REQUEST_CAPACITY: usize = 64;

/// Time allowed for queued publishes and DISCONNECT to reach the broker
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT transport for the bridge
pub struct MqttClient {
    base_topic: String,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
}

impl MqttClient {
    pub fn new(config: &MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        Ok(MqttClient {
            base_topic: config.topic.clone(),
            client,
            event_loop: Mutex::new(Some(event_loop)),
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            message_forwarder: Arc::new(Mutex::new(MessageForwarder::new(&config.topic))),
        })
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for ConnAck, a connection failure, or the timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match &*state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Publish a state change and log the transition
    fn transition(state_tx: &watch::Sender<ConnectionState>, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        let previous = state_tx.borrow().clone();
        HealthMonitor::log_state_transition(&previous, &next);
        let _ = state_tx.send(next);
    }

    /// Handle one routed event; returns false when the event loop must stop
    fn process_event_route(
        route: EventRoute,
        state_tx: &watch::Sender<ConnectionState>,
        message_forwarder: &Arc<Mutex<MessageForwarder>>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                Self::transition(state_tx, ConnectionEvent::ConnAckReceived);
                true
            }
            EventRoute::MessageReceived { topic, payload } => {
                let forwarder = message_forwarder
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                forwarder.forward(&topic, &payload);
                true
            }
            EventRoute::Disconnected => {
                Self::transition(state_tx, ConnectionEvent::DisconnectedByBroker);
                false
            }
            EventRoute::DisconnectSent => {
                Self::transition(state_tx, ConnectionEvent::ClientDisconnected);
                false
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!(target: "mqtt_transport", packet_id, "Subscription confirmed");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Connect to the broker and start the delivery task
    ///
    /// Only returns success once the broker has acknowledged the connection.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let taken = self
            .event_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let mut event_loop = taken.ok_or_else(|| {
            MqttError::ConnectionFailedStr("Event loop already started".to_string())
        })?;

        let ((state_tx, state_rx), (shutdown_tx, mut shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let message_forwarder = self.message_forwarder.clone();
        let base_topic = self.base_topic.clone();
        let span = crate::mqtt_span!(operation = "event_loop", base_topic = %base_topic);

        let handle = tokio::spawn(async move {
            info!(base_topic = %base_topic, "Starting MQTT event loop");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("Shutdown signal received, stopping MQTT event loop");
                            break;
                        }
                    }

                    event_result = event_loop.poll() => {
                        match event_result {
                            Ok(event) => {
                                let route = MessageHandler::route_mqtt_event(&event);
                                let keep_running =
                                    Self::process_event_route(route, &state_tx, &message_forwarder);
                                if !keep_running {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "MQTT event loop error");
                                Self::transition(
                                    &state_tx,
                                    ConnectionEvent::NetworkError(e.to_string()),
                                );
                                break;
                            }
                        }
                    }
                }
            }
            info!("MQTT event loop stopped");
        }.instrument(span));

        self.event_loop_handle = Some(handle);

        Self::wait_for_connection_confirmation(state_rx, CONNECT_TIMEOUT).await
    }

    /// Subscribe to `<base>/SET/#` at QoS 0
    pub async fn subscribe_to_commands(&mut self) -> Result<(), MqttError> {
        self.check_state(HealthMonitor::can_subscribe)?;

        let filter = TopicBuilder::command_filter(&self.base_topic);
        info!(filter = %filter, "Subscribing to command topic");

        self.client
            .subscribe(filter.clone(), QoS::AtMostOnce)
            .await
            .map_err(|e| {
                let message = format!("Failed to subscribe to {filter}: {e}");
                MqttError::SubscriptionFailed(message.into())
            })?;

        Ok(())
    }

    /// Disconnect from the broker and stop the delivery task
    ///
    /// DISCONNECT is queued behind any pending publishes; the event loop
    /// flushes them, sends it, and exits on its own. The task is only told to
    /// stop when that does not happen in time.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let requested = self.is_connected()
            && match self.client.disconnect().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "MQTT disconnect request failed");
                    false
                }
            };

        if let Some(mut handle) = self.event_loop_handle.take() {
            let flushed = requested
                && tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, &mut handle)
                    .await
                    .is_ok();

            if flushed {
                debug!("Event loop flushed and stopped after DISCONNECT");
            } else {
                if let Some(shutdown_tx) = &self.shutdown_tx {
                    let _ = shutdown_tx.send(true);
                }
                match tokio::time::timeout(Duration::from_secs(2), handle).await {
                    Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                    Ok(Err(e)) if !e.is_cancelled() => {
                        warn!(error = %e, "Event loop task ended with error");
                    }
                    Err(_) => warn!("Event loop task didn't shut down in time"),
                    _ => {}
                }
            }
        }

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(HealthMonitor::determine_next_state(
                ConnectionEvent::ClientDisconnected,
            ));
        }

        info!("MQTT client disconnected");
        Ok(())
    }

    /// Current connection state; `None` before `connect()`
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn check_state(&self, allowed: fn(&ConnectionState) -> bool) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !allowed(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }
        Ok(())
    }

    /// Publish one payload at QoS 0
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), MqttError> {
        self.check_state(HealthMonitor::can_publish)?;

        self.client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    pub fn set_command_sender(&self, sender: CommandSender) {
        let mut forwarder = self
            .message_forwarder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        forwarder.set_command_sender(sender);
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn subscribe_to_commands(&mut self) -> Result<(), Self::Error> {
        MqttClient::subscribe_to_commands(self).await
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload, retain).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn set_command_sender(&self, sender: CommandSender) {
        MqttClient::set_command_sender(self, sender)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
