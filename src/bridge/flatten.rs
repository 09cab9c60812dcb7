//! Flattening of nested status records into MQTT topics
//!
//! `{"fuel": {"level": 55}, "odometer": 1000}` for vehicle `ABC123` under
//! base `base` becomes `base/ABC123/fuel/level = 55` and
//! `base/ABC123/odometer = 1000`. Traversal is depth-first in document order.

use crate::observability::metrics::metrics;
use crate::protocol::{StatusRecord, TopicBuilder};
use crate::transport::Transport;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Default ceiling on mapping nesting
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Traversal errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("status record nested deeper than {max_depth} levels at '{path}'")]
    DepthExceeded { max_depth: usize, path: String },
}

/// Outcome of publishing one flattened record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    pub failed: usize,
}

/// Turns status records into (topic, payload) pairs and publishes them
#[derive(Debug, Clone, Copy)]
pub struct FlattenEncoder {
    max_depth: usize,
}

impl Default for FlattenEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl FlattenEncoder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Flatten a record into topic/payload pairs (pure function)
    ///
    /// The whole record is checked before anything is returned, so a record
    /// that is too deep yields an error and no pairs at all.
    pub fn flatten(
        &self,
        record: &StatusRecord,
        vin: &str,
        base_topic: &str,
    ) -> Result<Vec<(String, String)>, FlattenError> {
        let root = TopicBuilder::vehicle_root(base_topic, vin);
        let mut pairs = Vec::new();
        self.walk(record, &root, "", 1, &mut pairs)?;
        Ok(pairs)
    }

    fn walk(
        &self,
        map: &Map<String, Value>,
        topic: &str,
        path: &str,
        depth: usize,
        out: &mut Vec<(String, String)>,
    ) -> Result<(), FlattenError> {
        if depth > self.max_depth {
            return Err(FlattenError::DepthExceeded {
                max_depth: self.max_depth,
                path: path.to_string(),
            });
        }

        for (key, value) in map {
            let child_topic = TopicBuilder::child(topic, key);
            match value {
                Value::Object(nested) => {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}/{key}")
                    };
                    self.walk(nested, &child_topic, &child_path, depth + 1, out)?;
                }
                leaf => out.push((child_topic, stringify(leaf))),
            }
        }
        Ok(())
    }

    /// Flatten a record and publish every pair, retained
    ///
    /// Each pair is its own publish. A failed publish is logged and counted
    /// and the remaining pairs are still attempted.
    pub async fn publish<T: Transport>(
        &self,
        transport: &T,
        record: &StatusRecord,
        vin: &str,
        base_topic: &str,
    ) -> Result<PublishSummary, FlattenError> {
        let pairs = self.flatten(record, vin, base_topic)?;
        let mut summary = PublishSummary::default();

        for (topic, payload) in pairs {
            match transport.publish(&topic, payload.into_bytes(), true).await {
                Ok(()) => {
                    summary.published += 1;
                    metrics().mqtt_message_published();
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics().mqtt_publish_failed();
                    warn!(topic = %topic, error = %e, "Publish failed");
                }
            }
        }

        debug!(
            vin = %vin,
            published = summary.published,
            failed = summary.failed,
            "Published status record"
        );
        Ok(summary)
    }
}

/// Payload text for a leaf value
///
/// Strings are published without quotes, null as an empty payload, and
/// everything else in its compact JSON form.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
