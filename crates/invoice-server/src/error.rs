//! API Errors
//!
//! Every failure leaves the server as `{error, code}` JSON with a status
//! derived from the underlying `AgentError`.

use agent_core::AgentError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use invoice_agent::InvoiceError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Agent(e) => match e {
                AgentError::Validation(_) | AgentError::Argument(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AgentError::SchemaViolation(_) | AgentError::Provider(_) | AgentError::Parse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                AgentError::ProviderUnavailable(_) | AgentError::RateLimited(_) => StatusCode::SERVICE_UNAVAILABLE,
                AgentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unprocessable(_) => "UNPROCESSABLE",
            ApiError::Agent(e) => match e {
                AgentError::Validation(_) | AgentError::Argument(_) => "VALIDATION_ERROR",
                AgentError::SchemaViolation(_) => "EXTRACTION_FAILED",
                AgentError::Provider(_) | AgentError::Parse(_) => "PROVIDER_ERROR",
                AgentError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
                AgentError::RateLimited(_) => "RATE_LIMITED",
                AgentError::Timeout(_) => "PROVIDER_TIMEOUT",
                AgentError::MaxIterationsExceeded(_) => "MAX_ITERATIONS",
                _ => "AGENT_ERROR",
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Agent(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl From<InvoiceError> for ApiError {
    fn from(err: InvoiceError) -> Self {
        ApiError::Agent(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.message(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
