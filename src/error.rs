use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::{gateway::RemoteError, store::StoreError};

/// Stable, client-facing error identifier.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    DuplicateEnrollment,
    ServiceCommunicationError,
    ValidationError,
    InvalidState,
    InternalError,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    DuplicateEnrollment(String),
    /// A hard dependency failed. `missing` is set when the collaborator
    /// answered but reported the entity absent.
    #[error("{message}")]
    ServiceCommunication { message: String, missing: bool },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn enrollment_not_found(id: i64) -> Self {
        AppError::NotFound(format!("Enrollment not found with id: {id}"))
    }

    /// Maps a failed existence check or answer-key fetch.
    pub fn hard_dependency(err: RemoteError) -> Self {
        AppError::ServiceCommunication { missing: err.is_not_found(), message: err.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::DuplicateEnrollment(_) => ErrorKind::DuplicateEnrollment,
            AppError::ServiceCommunication { .. } => ErrorKind::ServiceCommunicationError,
            AppError::Validation(_) => ErrorKind::ValidationError,
            AppError::InvalidState(_) => ErrorKind::InvalidState,
            AppError::Store(_) | AppError::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateEnrollment(_) => StatusCode::CONFLICT,
            AppError::ServiceCommunication { missing: true, .. } => StatusCode::NOT_FOUND,
            AppError::ServiceCommunication { missing: false, .. } => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    error: ErrorKind,
    message: String,
    timestamp: chrono::DateTime<Utc>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self.kind() {
            ErrorKind::InternalError => {
                tracing::error!(error = %self, "internal error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };
        let body = ErrorBody {
            status: status.as_u16(),
            error: self.kind(),
            message,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub(crate) fn require_positive(field: &str, value: i64) -> Result<(), AppError> {
    if value <= 0 {
        return Err(AppError::Validation(format!("{field} must be a positive id, got {value}")));
    }
    Ok(())
}
