//! Pure message routing for MQTT events
//!
//! The event-loop task routes each rumqttc event through
//! [`MessageHandler::route_mqtt_event`]; received publishes under the command
//! filter are handed to the [`MessageForwarder`] which only enqueues.

use crate::bridge::channel::CommandSender;
use crate::protocol::{RawCommand, TopicBuilder};
use rumqttc::v5::Event;
use rumqttc::Outgoing;
use tracing::{debug, warn};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => {
                use rumqttc::v5::mqttbytes::v5::Packet;
                match incoming {
                    Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                    Packet::Publish(publish) => EventRoute::MessageReceived {
                        topic: String::from_utf8_lossy(&publish.topic).to_string(),
                        payload: publish.payload.to_vec(),
                    },
                    Packet::Disconnect(_) => EventRoute::Disconnected,
                    Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                        packet_id: suback.pkid,
                    },
                    other => EventRoute::InfrastructureEvent(format!("{other:?}")),
                }
            }
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Payloads are plain text; invalid UTF-8 is replaced rather than rejected
    pub fn decode_payload(payload: &[u8]) -> String {
        String::from_utf8_lossy(payload).into_owned()
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker sent a disconnect
    Disconnected,
    /// Our own DISCONNECT went out after the queued requests
    DisconnectSent,
    /// Subscription confirmed
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PingResp, PubAck, ...)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Hands received commands to the bridge loop
#[derive(Debug)]
pub struct MessageForwarder {
    command_filter: String,
    sender: Option<CommandSender>,
}

impl MessageForwarder {
    pub fn new(base_topic: &str) -> Self {
        Self {
            command_filter: TopicBuilder::command_filter(base_topic),
            sender: None,
        }
    }

    pub fn set_command_sender(&mut self, sender: CommandSender) {
        self.sender = Some(sender);
    }

    /// Enqueue a received publish if it is on the command filter
    ///
    /// Returns whether the message was queued.
    pub fn forward(&self, topic: &str, payload: &[u8]) -> bool {
        if !TopicBuilder::matches_filter(&self.command_filter, topic) {
            debug!(topic = %topic, "Ignoring message outside command filter");
            return false;
        }

        let Some(sender) = &self.sender else {
            warn!(topic = %topic, "Command received but no command sender configured - dropped");
            return false;
        };

        let command = RawCommand::new(topic, MessageHandler::decode_payload(payload));
        match sender.enqueue(command) {
            Ok(()) => {
                debug!(topic = %topic, "Command queued");
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Command dropped");
                false
            }
        }
    }
}
