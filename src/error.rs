// Error handling module
// Defines the Netatmo client errors and their HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the Netatmo client
#[derive(Error, Debug)]
pub enum NetatmoError {
    /// Token endpoint refused the refresh-token grant
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Domain endpoint answered non-2xx after the retry budget
    #[error("Netatmo API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Parse(String),

    /// Transport failure (DNS, connection reset, timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl NetatmoError {
    /// Whether the failure came back as an HTTP 401
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, NetatmoError::Api { status: 401, .. })
    }
}

/// Errors returned by the bridge HTTP surface
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bridge API key missing or wrong
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Netatmo could not be reached or refused the call
    #[error("Communication failure: {0}")]
    Communication(#[from] NetatmoError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "auth_error", msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Communication(err) => {
                tracing::error!("Netatmo communication failure: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "communication_failure",
                    err.to_string(),
                )
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}
