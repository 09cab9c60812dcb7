//! Mock implementations for testing
//!
//! `MockTransport` and `MockVehicleApi` record every call so bridge
//! behaviour can be asserted without a broker or the vendor service. Both
//! are cheap to clone and clones share their recordings.

use crate::bridge::channel::CommandSender;
use crate::protocol::{RawCommand, StatusRecord, VehicleId, VehicleRecord};
use crate::transport::{ConnectionState, Transport};
use crate::vehicle_api::{VehicleApi, VehicleApiError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Error returned by the mock transport
#[derive(Debug, Error)]
#[error("mock transport: {0}")]
pub struct MockTransportError(pub String);

/// One recorded publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published: Arc<Mutex<Vec<PublishedMessage>>>,
    pub connected: Arc<AtomicBool>,
    pub subscribed: Arc<AtomicBool>,
    pub disconnect_calls: Arc<AtomicUsize>,
    pub failing_topics: Arc<Mutex<HashSet<String>>>,
    pub command_sender: Arc<Mutex<Option<CommandSender>>>,
    pub should_fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that is already connected
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        transport
    }

    /// A transport whose `connect` fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Make publishes to this exact topic fail
    pub fn fail_publish_on(&self, topic: &str) {
        lock(&self.failing_topics).insert(topic.to_string());
    }

    /// Simulate the broker going away
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Deliver an inbound message as the broker delivery task would
    ///
    /// Returns false when no command sender is registered or the channel is
    /// closed.
    pub fn inject_command(&self, topic: &str, payload: &str) -> bool {
        match lock(&self.command_sender).as_ref() {
            Some(sender) => sender.enqueue(RawCommand::new(topic, payload)).is_ok(),
            None => false,
        }
    }

    pub fn has_command_sender(&self) -> bool {
        lock(&self.command_sender).is_some()
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    pub fn published_topics(&self) -> Vec<String> {
        lock(&self.published)
            .iter()
            .map(|m| m.topic.clone())
            .collect()
    }

    /// Payload last published on a topic
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        lock(&self.published)
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(PublishedMessage::payload_str)
    }

    pub fn clear_history(&self) {
        lock(&self.published).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MockTransportError("Mock connection failure".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe_to_commands(&mut self) -> Result<(), Self::Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MockTransportError("not connected".to_string()));
        }
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MockTransportError("not connected".to_string()));
        }
        if lock(&self.failing_topics).contains(topic) {
            return Err(MockTransportError(format!("Mock publish failure on {topic}")));
        }

        lock(&self.published).push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        Some(if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected("mock".to_string())
        })
    }

    fn set_command_sender(&self, sender: CommandSender) {
        *lock(&self.command_sender) = Some(sender);
    }
}

/// A recorded vendor API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListVehicles,
    GetStatus(VehicleId),
    GetEvStatus(VehicleId),
    Refresh(VehicleId),
    Close,
}

/// Mock vendor API for testing
#[derive(Debug, Clone, Default)]
pub struct MockVehicleApi {
    pub fleet: Arc<Mutex<Vec<VehicleRecord>>>,
    pub statuses: Arc<Mutex<HashMap<VehicleId, StatusRecord>>>,
    pub ev_statuses: Arc<Mutex<HashMap<VehicleId, StatusRecord>>>,
    pub calls: Arc<Mutex<Vec<ApiCall>>>,
    pub call_times: Arc<Mutex<Vec<Instant>>>,
    pub fail_listing: Arc<AtomicBool>,
    pub fail_status: Arc<AtomicBool>,
    pub failing_refreshes: Arc<Mutex<HashSet<VehicleId>>>,
}

impl MockVehicleApi {
    pub fn new(fleet: Vec<VehicleRecord>) -> Self {
        Self {
            fleet: Arc::new(Mutex::new(fleet)),
            ..Default::default()
        }
    }

    /// Status returned for a vehicle; non-object values are stored as empty
    pub fn set_status(&self, id: &str, status: Value) {
        lock(&self.statuses).insert(VehicleId::new(id), into_record(status));
    }

    pub fn set_ev_status(&self, id: &str, status: Value) {
        lock(&self.ev_statuses).insert(VehicleId::new(id), into_record(status));
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn fail_status_fetch(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    pub fn fail_refresh_for(&self, id: &str) {
        lock(&self.failing_refreshes).insert(VehicleId::new(id));
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    /// Calls paired with the (tokio) time they were made
    pub fn timed_calls(&self) -> Vec<(ApiCall, Instant)> {
        let calls = lock(&self.calls);
        let times = lock(&self.call_times);
        calls.iter().cloned().zip(times.iter().copied()).collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
        lock(&self.call_times).clear();
    }

    fn record(&self, call: ApiCall) {
        lock(&self.calls).push(call);
        lock(&self.call_times).push(Instant::now());
    }
}

fn into_record(value: Value) -> StatusRecord {
    match value {
        Value::Object(map) => map,
        _ => StatusRecord::new(),
    }
}

#[async_trait]
impl VehicleApi for MockVehicleApi {
    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, VehicleApiError> {
        self.record(ApiCall::ListVehicles);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(VehicleApiError::auth("Mock login failure"));
        }
        Ok(lock(&self.fleet).clone())
    }

    async fn get_status(&self, id: &VehicleId) -> Result<StatusRecord, VehicleApiError> {
        self.record(ApiCall::GetStatus(id.clone()));
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(VehicleApiError::status(503, "Mock status failure"));
        }
        Ok(lock(&self.statuses).get(id).cloned().unwrap_or_default())
    }

    async fn get_ev_status(&self, id: &VehicleId) -> Result<StatusRecord, VehicleApiError> {
        self.record(ApiCall::GetEvStatus(id.clone()));
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(VehicleApiError::status(503, "Mock status failure"));
        }
        Ok(lock(&self.ev_statuses).get(id).cloned().unwrap_or_default())
    }

    async fn refresh_status(&self, id: &VehicleId) -> Result<(), VehicleApiError> {
        self.record(ApiCall::Refresh(id.clone()));
        if lock(&self.failing_refreshes).contains(id) {
            return Err(VehicleApiError::status(500, "Mock refresh failure"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), VehicleApiError> {
        self.record(ApiCall::Close);
        Ok(())
    }
}
