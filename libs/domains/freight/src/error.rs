use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type for freight operations
pub type FreightResult<T> = Result<T, FreightError>;

/// Errors that can occur while quoting freight
#[derive(Debug, Error)]
pub enum FreightError {
    /// Missing or invalid request fields, including an unknown pinned crossing point
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fee configuration for a crossing point could not be loaded
    #[error("Configuration not found for crossing point: {0}")]
    ConfigurationNotFound(String),

    /// Distance, rate or configuration service answered with an error
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Transport failure talking to an external service
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid amount or currency code handed to the converter
    #[error("Currency conversion error: {0}")]
    CurrencyConversion(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FreightError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FreightError::Validation(_) => StatusCode::BAD_REQUEST,
            FreightError::ConfigurationNotFound(_) => StatusCode::NOT_FOUND,
            FreightError::ExternalService(_) | FreightError::Http(_) => StatusCode::BAD_GATEWAY,
            FreightError::CurrencyConversion(_) | FreightError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for FreightError {
    fn from(rejection: JsonRejection) -> Self {
        FreightError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for FreightError {
    fn from(rejection: QueryRejection) -> Self {
        FreightError::Validation(rejection.body_text())
    }
}

impl IntoResponse for FreightError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            FreightError::CurrencyConversion(_) | FreightError::Internal(_) => {
                tracing::error!(error = %self, "Internal error while quoting freight");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
