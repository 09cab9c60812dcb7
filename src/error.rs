//! Top-level error types for the bridge
//!
//! Every layer has its own `thiserror` enum; `BridgeError` wraps them and
//! classifies each failure into the bridge's handling tiers.

use crate::bridge::flatten::FlattenError;
use crate::config::ConfigError;
use crate::vehicle_api::VehicleApiError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// How the bridge reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Startup cannot proceed; the process exits without entering Running
    Fatal,
    /// Logged; the loop continues with the next item or tick
    Recoverable,
    /// Escaped the Running body; the bridge shuts down
    LoopFatal,
}

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Unable to enumerate vehicle fleet: {0}")]
    FleetUnavailable(#[source] VehicleApiError),

    #[error("Vehicle API error: {0}")]
    VehicleApi(#[from] VehicleApiError),

    #[error("Unable to connect to broker: {0}")]
    BrokerUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Startup failed: {0}")]
    Startup(#[source] Box<BridgeError>),

    #[error("Status traversal failed: {0}")]
    Flatten(#[from] FlattenError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker connection lost (state: {state})")]
    BrokerConnectionLost { state: String },

    #[error("Vehicle '{vin}' is not part of the fleet")]
    VehicleNotFound { vin: String },
}

impl BridgeError {
    /// Mark an error raised while building or starting the bridge as fatal
    pub fn startup<E: Into<BridgeError>>(error: E) -> Self {
        match error.into() {
            startup @ BridgeError::Startup(_) => startup,
            other => Self::Startup(Box::new(other)),
        }
    }

    /// Wrap a broker error raised before the bridge is running
    pub fn broker_unavailable<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::BrokerUnavailable(Box::new(error))
    }

    pub fn connection_lost<S: Into<String>>(state: S) -> Self {
        Self::BrokerConnectionLost {
            state: state.into(),
        }
    }

    pub fn vehicle_not_found<S: Into<String>>(vin: S) -> Self {
        Self::VehicleNotFound { vin: vin.into() }
    }

    /// Handling tier of this error when it escapes to the bridge
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::FleetUnavailable(_)
            | BridgeError::BrokerUnavailable(_)
            | BridgeError::Config(_)
            | BridgeError::Startup(_) => ErrorKind::Fatal,
            BridgeError::VehicleNotFound { .. } => ErrorKind::Recoverable,
            BridgeError::VehicleApi(_)
            | BridgeError::Flatten(_)
            | BridgeError::BrokerConnectionLost { .. } => ErrorKind::LoopFatal,
        }
    }

    /// Error text safe to write to logs
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret|authorization)[=:]\s*\S+").ok());

static BEARER_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").ok());

const MAX_MESSAGE_LEN: usize = 500;

/// Redact credentials from error text and cap its length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(pattern) = SECRET_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "${1}=***").to_string();
    }
    if let Some(pattern) = BEARER_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "Bearer ***").to_string();
    }

    if sanitized.len() > MAX_MESSAGE_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], suffix);
    }

    sanitized
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
