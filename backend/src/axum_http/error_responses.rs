use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use crates::application::usecases::{bookings::BookingError, payments::PaymentError};
use serde::Serialize;
use tracing::error;

/// Error envelope every failed request is rendered into. `message` is a plain
/// string except for validation errors, which carry one entry per violation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub message: ErrorMessage,
    pub timestamp: DateTime<Utc>,
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    Single(String),
    Fields(Vec<String>),
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: ErrorMessage,
    path: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>, path: &str) -> Self {
        Self {
            status,
            message: ErrorMessage::Single(message.into()),
            path: path.to_string(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found", path)
    }

    pub fn forbidden(path: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden", path)
    }

    pub fn from_booking(err: BookingError, path: &str) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match err {
            BookingError::Validation { violations } => ErrorMessage::Fields(violations),
            BookingError::Internal(err) => {
                // Don't leak internal error detail to the client.
                error!(error = ?err, path, "request failed");
                ErrorMessage::Single("Internal server error".to_string())
            }
            other => ErrorMessage::Single(other.to_string()),
        };

        Self {
            status,
            message,
            path: path.to_string(),
        }
    }

    pub fn from_payment(err: PaymentError, path: &str) -> Self {
        match err {
            PaymentError::Booking(inner) => Self::from_booking(inner, path),
            PaymentError::Internal(err) => {
                error!(error = ?err, path, "request failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    path,
                )
            }
            other => {
                let status = StatusCode::from_u16(other.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Self::new(status, other.to_string(), path)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorEnvelope {
            status_code: self.status.as_u16(),
            message: self.message,
            timestamp: Utc::now(),
            path: self.path,
        });

        (self.status, body).into_response()
    }
}
