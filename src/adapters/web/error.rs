//! HTTP error responses for web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use crate::domain::error::PortfolioError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }
}

pub fn status_from_error(err: &PortfolioError) -> StatusCode {
    match err {
        PortfolioError::Validation { .. }
        | PortfolioError::ConfigParse { .. }
        | PortfolioError::ConfigMissing { .. }
        | PortfolioError::ConfigInvalid { .. } => StatusCode::BAD_REQUEST,
        PortfolioError::NoCandidates { .. } => StatusCode::NOT_FOUND,
        PortfolioError::InfeasibleConstraints { .. }
        | PortfolioError::InconsistentAllocation { .. }
        | PortfolioError::InsufficientHistory { .. }
        | PortfolioError::PriceUnavailable { .. }
        | PortfolioError::BenchmarkUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PortfolioError::OptimizationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PortfolioError::Computation { .. }
        | PortfolioError::Database { .. }
        | PortfolioError::DatabaseQuery { .. }
        | PortfolioError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PortfolioError> for WebError {
    fn from(err: PortfolioError) -> Self {
        Self::new(status_from_error(&err), err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), message = %self.message, "request failed");
        } else {
            warn!(status = self.status.as_u16(), message = %self.message, "request rejected");
        }
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}
