//! HTTP implementation of the vendor telemetry API
//!
//! One login per session; the bearer token is cached and dropped again when
//! the API answers 401 so that the next call logs in afresh.

use super::{VehicleApi, VehicleApiError};
use crate::config::{Region, VehicleApiSection};
use crate::protocol::{StatusRecord, VehicleId, VehicleRecord};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Header carrying the account region on every request
pub const REGION_HEADER: &str = "X-Region";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Vendor API client over reqwest
pub struct HttpVehicleApi {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    region: Region,
    token: Mutex<Option<String>>,
}

impl HttpVehicleApi {
    pub fn new(section: &VehicleApiSection, password: String) -> Result<Self, VehicleApiError> {
        if password.is_empty() {
            return Err(VehicleApiError::NotConfigured(
                "vehicle API password is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .map_err(|e| VehicleApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            username: section.username.clone(),
            password,
            region: section.region,
            token: Mutex::new(None),
        })
    }

    /// Join a path onto the base URL (pure function)
    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{base_url}{path}")
    }

    fn vehicle_endpoint(&self, id: &VehicleId, suffix: &str) -> String {
        Self::endpoint(&self.base_url, &format!("/vehicles/{id}{suffix}"))
    }

    /// Log in and cache the session token
    async fn login(&self) -> Result<String, VehicleApiError> {
        debug!(
            username = %self.username,
            region = self.region.as_str(),
            "Logging in to vehicle API"
        );

        let response = self
            .client
            .post(Self::endpoint(&self.base_url, "/auth/login"))
            .header(REGION_HEADER, self.region.as_str())
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
                region: self.region.as_str(),
            })
            .send()
            .await
            .map_err(|e| VehicleApiError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VehicleApiError::auth(format!(
                "login rejected for {}",
                self.username
            )));
        }
        let login: LoginResponse = Self::parse_json(Self::check_status(response).await?).await?;

        info!(region = self.region.as_str(), "Vehicle API session established");
        Ok(login.token)
    }

    async fn session_token(&self) -> Result<String, VehicleApiError> {
        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = self.login().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    /// Send an authenticated request once
    async fn send(&self, request: RequestBuilder) -> Result<Response, VehicleApiError> {
        let token = self.session_token().await?;
        let response = request
            .bearer_auth(token)
            .header(REGION_HEADER, self.region.as_str())
            .send()
            .await
            .map_err(|e| VehicleApiError::Network(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
            return Err(VehicleApiError::auth("session token rejected"));
        }

        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response, VehicleApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VehicleApiError::status(status.as_u16(), body))
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, VehicleApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| VehicleApiError::invalid_response(e.to_string()))
    }
}

#[async_trait]
impl VehicleApi for HttpVehicleApi {
    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, VehicleApiError> {
        let response = self
            .send(self.client.get(Self::endpoint(&self.base_url, "/vehicles")))
            .await?;
        let vehicles: Vec<VehicleRecord> = Self::parse_json(response).await?;
        debug!(count = vehicles.len(), "Fetched vehicle list");
        Ok(vehicles)
    }

    async fn get_status(&self, id: &VehicleId) -> Result<StatusRecord, VehicleApiError> {
        let response = self
            .send(self.client.get(self.vehicle_endpoint(id, "/status")))
            .await?;
        Self::parse_json(response).await
    }

    async fn get_ev_status(&self, id: &VehicleId) -> Result<StatusRecord, VehicleApiError> {
        let response = self
            .send(self.client.get(self.vehicle_endpoint(id, "/ev-status")))
            .await?;
        Self::parse_json(response).await
    }

    async fn refresh_status(&self, id: &VehicleId) -> Result<(), VehicleApiError> {
        self.send(self.client.post(self.vehicle_endpoint(id, "/refresh")))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), VehicleApiError> {
        let Some(token) = self.token.lock().await.take() else {
            return Ok(());
        };

        let result = self
            .client
            .post(Self::endpoint(&self.base_url, "/auth/logout"))
            .bearer_auth(token)
            .header(REGION_HEADER, self.region.as_str())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Vehicle API session closed");
                Ok(())
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Vehicle API logout rejected");
                Err(VehicleApiError::status(
                    response.status().as_u16(),
                    "logout rejected",
                ))
            }
            Err(e) => Err(VehicleApiError::Network(e.to_string())),
        }
    }
}
