//! Observability: structured logging and process metrics

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, parse_spans, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

pub use logging::{bridge_span, mqtt_span, vehicle_span};
