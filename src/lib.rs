//! mz2mqtt - vehicle telemetry to MQTT bridge
//!
//! Polls an account-based vehicle telemetry API, republishes each vehicle's
//! nested status as flat retained MQTT topics, and accepts `refresh`
//! commands on `<base>/SET/<VIN>/refresh`.
//!
//! # Quick Start
//!
//! ```rust
//! use mz2mqtt::bridge::FlattenEncoder;
//! use serde_json::json;
//!
//! let status = json!({"fuel": {"level": 55}, "odometer": 1000});
//! let pairs = FlattenEncoder::default()
//!     .flatten(status.as_object().unwrap(), "ABC123", "mz2mqtt")
//!     .unwrap();
//!
//! assert_eq!(pairs[0], ("mz2mqtt/ABC123/fuel/level".to_string(), "55".to_string()));
//! assert_eq!(pairs[1], ("mz2mqtt/ABC123/odometer".to_string(), "1000".to_string()));
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod vehicle_api;

pub use bridge::{BridgeLoop, BridgeOptions, BridgeState};
pub use config::*;
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
pub use vehicle_api::{HttpVehicleApi, VehicleApi, VehicleApiError};
