//! Mapping from component errors to HTTP responses.
//!
//! | status | meaning |
//! |---|---|
//! | 400 | malformed, duplicate or rule-violating input |
//! | 403 | machine or session credential rejected |
//! | 404 | game, character or machine not found |
//! | 500 | unexpected internal failure |
//! | 503 | no machine capacity, or the game is full |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::accounts::AccountError;
use crate::connect::ConnectError;
use crate::registry::RegistryError;
use crate::scheduler::SchedulerError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn internal(e: &impl std::fmt::Display) -> Self {
        error!(error = %e, "Request failed");
        Self::Internal("Internal Server Error".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => m,
        };
        (status, body).into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::InvalidInput(_)
            | AccountError::UsernameTaken
            | AccountError::NameTaken
            | AccountError::InvalidCredentials
            | AccountError::AlreadyActive => Self::BadRequest(e.to_string()),
            AccountError::InvalidSession => Self::Forbidden(e.to_string()),
            AccountError::CharacterNotFound => Self::NotFound(e.to_string()),
            AccountError::Hash(_)
            | AccountError::Snapshot(_)
            | AccountError::Token(_)
            | AccountError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::InvalidInput(m) => Self::BadRequest(m),
            SchedulerError::InvalidCredential => Self::Forbidden(e.to_string()),
            SchedulerError::NotFound(_) => Self::NotFound("Game Not Found".into()),
            SchedulerError::NoAvailableMachines => {
                Self::Unavailable("No Available Servers".into())
            }
            SchedulerError::MachineUnavailable(_) => Self::Unavailable(e.to_string()),
            SchedulerError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<ConnectError> for ApiError {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::InvalidMachineCredential | ConnectError::InvalidSession => {
                Self::Forbidden(e.to_string())
            }
            ConnectError::GameNotFound
            | ConnectError::CharacterNotFound
            | ConnectError::NotSeated => Self::NotFound(e.to_string()),
            ConnectError::GameFull => Self::Unavailable(e.to_string()),
            ConnectError::Snapshot(_) | ConnectError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidCredential | RegistryError::Token(_) => {
                Self::Forbidden("Invalid machine credential".into())
            }
            RegistryError::Database(_) => Self::internal(&e),
        }
    }
}
