//! HTTP client for a worker machine's launch endpoint.

use std::time::Duration;

use thorium_core::wire::{NewGameServer, NewGameServerResponse};

use crate::storage::Machine;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Worker rejected launch ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Sends provisioning requests to worker machines.
///
/// Every request is bounded by the client's timeout; a timeout is reported
/// like any other transport failure.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
}

impl WorkerClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // reqwest is built without a default crypto provider.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    fn games_url(machine: &Machine) -> String {
        if machine.remote_address.contains(':') {
            format!(
                "http://[{}]:{}/games",
                machine.remote_address, machine.service_listen_port
            )
        } else {
            format!(
                "http://{}:{}/games",
                machine.remote_address, machine.service_listen_port
            )
        }
    }

    /// Ask `machine` to start a game server.
    pub async fn launch(
        &self,
        machine: &Machine,
        request: &NewGameServer,
    ) -> Result<NewGameServerResponse, LaunchError> {
        let resp = self
            .http
            .post(Self::games_url(machine))
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LaunchError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}
