//! Thread-safe metrics collection
//!
//! Atomic counters for publishing, polling and command handling. The bridge
//! logs a snapshot when it shuts down.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // MQTT
    mqtt_connected: AtomicBool,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,

    // Polling
    scheduled_polls: AtomicU64,
    vehicles_polled: AtomicU64,
    poll_failures: AtomicU64,

    // Commands
    commands_received: AtomicU64,
    commands_rejected: AtomicU64,
    refreshes_requested: AtomicU64,
    refresh_failures: AtomicU64,

    // Lifecycle
    bridge_state: Mutex<String>,
    state_transitions: AtomicU64,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            mqtt_connected: AtomicBool::new(false),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            scheduled_polls: AtomicU64::new(0),
            vehicles_polled: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            commands_received: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            refreshes_requested: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            bridge_state: Mutex::new("starting".to_string()),
            state_transitions: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // MQTT metrics
    pub fn mqtt_connection_changed(&self, connected: bool) {
        self.mqtt_connected.store(connected, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Polling metrics
    pub fn scheduled_poll(&self) {
        self.scheduled_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn vehicle_polled(&self) {
        self.vehicles_polled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn poll_failed(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Command metrics
    pub fn command_received(&self) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_requested(&self) {
        self.refreshes_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_failed(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Lifecycle metrics
    pub fn set_bridge_state(&self, state: &str) {
        if let Ok(mut current_state) = self.bridge_state.lock() {
            if *current_state != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current_state = state.to_string();
            }
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let current_state = self
            .bridge_state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
            },
            polling: PollingMetrics {
                scheduled_polls: self.scheduled_polls.load(Ordering::Relaxed),
                vehicles_polled: self.vehicles_polled.load(Ordering::Relaxed),
                poll_failures: self.poll_failures.load(Ordering::Relaxed),
            },
            commands: CommandMetrics {
                commands_received: self.commands_received.load(Ordering::Relaxed),
                commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
                refreshes_requested: self.refreshes_requested.load(Ordering::Relaxed),
                refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_state,
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub mqtt: MqttMetrics,
    pub polling: PollingMetrics,
    pub commands: CommandMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub messages_published: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct PollingMetrics {
    pub scheduled_polls: u64,
    pub vehicles_polled: u64,
    pub poll_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct CommandMetrics {
    pub commands_received: u64,
    pub commands_rejected: u64,
    pub refreshes_requested: u64,
    pub refresh_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
    pub state_transitions: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
