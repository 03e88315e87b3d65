//! Domain error taxonomy shared by the lifecycle engine and the HTTP
//! boundary. Every variant is recoverable by the caller; the boundary maps
//! each onto an HTTP status and the `{code, message, data}` envelope.

use crate::shared::enums::TicketStatus;
use crate::shared::response::error_body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("operation not permitted in status {0}")]
    InvalidState(TicketStatus),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Pool(String),
}

impl TicketError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } | Self::InvalidAssignment(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for TicketError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record"),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for TicketError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Database(e) => {
                log::error!("database error: {e}");
                "Internal server error".to_string()
            }
            Self::Pool(e) => {
                log::error!("connection pool error: {e}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, error_body(status.as_u16(), &message)).into_response()
    }
}
