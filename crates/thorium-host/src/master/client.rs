//! HTTP client for the master coordinator.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use thorium_core::wire::{
    MachineRegisterResponse, MachineStatus, RegisterMachine, UnregisterMachine,
};

/// Master client errors.
#[derive(Debug, Error)]
pub enum MasterClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Master returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// A master response passed back to a local game server untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarded {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Client for the endpoints a host calls on the master.
#[derive(Debug, Clone)]
pub struct MasterClient {
    http: reqwest::Client,
    base_url: String,
}

impl MasterClient {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MasterClientError> {
        // reqwest uses rustls-no-provider; `Err` means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, MasterClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(MasterClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Register this machine, announcing the port its own service listens on.
    pub async fn register(
        &self,
        service_port: u16,
    ) -> Result<MachineRegisterResponse, MasterClientError> {
        let resp = self
            .http
            .post(self.url("/machines/register"))
            .json(&RegisterMachine { service_port })
            .send()
            .await?;
        Ok(Self::check_status(resp).await?.json().await?)
    }

    pub async fn heartbeat(&self, status: &MachineStatus) -> Result<(), MasterClientError> {
        let resp = self
            .http
            .post(self.url("/machines/status"))
            .json(status)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    pub async fn unregister(
        &self,
        machine_id: i64,
        machine_key: &str,
    ) -> Result<(), MasterClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/machines/{machine_id}/disconnect")))
            .json(&UnregisterMachine {
                machine_key: machine_key.to_string(),
            })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    /// POST `body` to `path` and return whatever the master answered,
    /// error statuses included.
    pub async fn forward<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Forwarded, MasterClientError> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;
        Ok(Forwarded {
            status,
            content_type,
            body,
        })
    }
}
