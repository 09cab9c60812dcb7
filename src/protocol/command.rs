//! Inbound command decoding
//!
//! Commands arrive as MQTT publishes on `<base>/SET/<VIN>/<field>`. The
//! transport only forwards the raw topic and payload; turning them into a
//! typed [`Command`] happens on the bridge side.

use thiserror::Error;

/// Literal topic level that marks a command, matched case-insensitively
pub const COMMAND_SEGMENT: &str = "SET";

/// Raw inbound message as delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub topic: String,
    pub payload: String,
}

impl RawCommand {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Actions a command can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Ask the vendor to refresh the vehicle and republish its status
    Refresh,
    /// Anything else; reported and ignored
    Unknown,
}

/// A decoded command addressed to one vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub vin: String,
    pub action: CommandAction,
    /// Field segment as received, kept for error reporting
    pub field: String,
    pub argument: String,
}

/// Command decoding errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("topic '{topic}' is outside base topic '{base}'")]
    ForeignTopic { topic: String, base: String },
    #[error("topic '{0}' must have the form <base>/SET/<VIN>/<field>")]
    MalformedTopic(String),
    #[error("topic '{0}' is not a SET command")]
    NotACommand(String),
}

/// Decodes raw inbound messages for one base topic
#[derive(Debug, Clone)]
pub struct CommandParser {
    base_topic: String,
}

impl CommandParser {
    pub fn new(base_topic: impl Into<String>) -> Self {
        Self {
            base_topic: base_topic.into(),
        }
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn parse_raw(&self, raw: &RawCommand) -> Result<Command, ParseError> {
        self.parse(&raw.topic, &raw.payload)
    }

    pub fn parse(&self, topic: &str, payload: &str) -> Result<Command, ParseError> {
        let rest = topic
            .strip_prefix(self.base_topic.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ParseError::ForeignTopic {
                topic: topic.to_string(),
                base: self.base_topic.clone(),
            })?;

        let segments: Vec<&str> = rest.split('/').collect();
        let [marker, vin, field] = segments.as_slice() else {
            return Err(ParseError::MalformedTopic(topic.to_string()));
        };

        if !marker.eq_ignore_ascii_case(COMMAND_SEGMENT) {
            return Err(ParseError::NotACommand(topic.to_string()));
        }
        if vin.is_empty() || field.is_empty() {
            return Err(ParseError::MalformedTopic(topic.to_string()));
        }

        Ok(Command {
            vin: vin.to_string(),
            action: Self::action_for(field),
            field: field.to_string(),
            argument: payload.to_string(),
        })
    }

    fn action_for(field: &str) -> CommandAction {
        match field {
            "refresh" => CommandAction::Refresh,
            _ => CommandAction::Unknown,
        }
    }
}
