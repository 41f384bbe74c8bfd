//! Server-side errors and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devcert_dispenser::DispenserError;
use serde_json::json;
use thiserror::Error;

/// Errors of the server and CLI
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration file missing or invalid
    #[error("config error: {0}")]
    Config(String),

    /// Malformed HTTP request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Issuance or CA failure
    #[error(transparent)]
    Dispenser(#[from] DispenserError),

    /// Listener or filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Dispenser(DispenserError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}

/// Result alias for the server crate
pub type Result<T, E = AppError> = core::result::Result<T, E>;
