//! HTTP error responses of the host service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::master::MasterClientError;
use crate::supervisor::SupervisorError;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid Key")]
    InvalidKey,

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal Server Error")]
    Internal,
}

impl HostError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidKey => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

impl From<SupervisorError> for HostError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::CapacityExhausted { .. } | SupervisorError::PortsExhausted => {
                Self::Unavailable(e.to_string())
            }
            other => {
                error!(error = %other, "Game server launch failed");
                Self::Internal
            }
        }
    }
}

impl From<MasterClientError> for HostError {
    fn from(e: MasterClientError) -> Self {
        error!(error = %e, "Master call failed");
        Self::Internal
    }
}

impl From<axum::extract::rejection::JsonRejection> for HostError {
    fn from(e: axum::extract::rejection::JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}
