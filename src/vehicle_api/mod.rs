//! Vendor telemetry API abstraction
//!
//! The bridge loop only depends on [`VehicleApi`]; the HTTP client in
//! [`http`] is one implementation and the test mocks are another.

use crate::protocol::{StatusRecord, VehicleId, VehicleRecord};
use async_trait::async_trait;
use thiserror::Error;

pub mod http;

pub use http::HttpVehicleApi;

/// Vendor API errors
#[derive(Debug, Error)]
pub enum VehicleApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl VehicleApiError {
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Authentication(message.into())
    }

    pub fn status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse(message.into())
    }
}

/// Account-based vehicle telemetry API
///
/// Every call is a single best-effort attempt; callers decide what a failure
/// means for the bridge.
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// Enumerate the vehicles of the account
    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, VehicleApiError>;

    /// Current status of one vehicle
    async fn get_status(&self, id: &VehicleId) -> Result<StatusRecord, VehicleApiError>;

    /// Current EV status of one vehicle (battery, charging, ...)
    async fn get_ev_status(&self, id: &VehicleId) -> Result<StatusRecord, VehicleApiError>;

    /// Ask the vendor to pull fresh data from the vehicle
    ///
    /// Returns once the request is accepted; the data is only available
    /// after the vendor has materialised it.
    async fn refresh_status(&self, id: &VehicleId) -> Result<(), VehicleApiError>;

    /// End the API session
    async fn close(&self) -> Result<(), VehicleApiError>;
}
