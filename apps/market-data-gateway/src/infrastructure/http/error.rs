//! API error responses.
//!
//! Every failure leaves the gateway as
//! `{"error": {"code": "...", "message": "..."}}` with a stable code.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::ports::MarketDataError;

/// Stable error codes exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request (400).
    InvalidInput,
    /// Unknown symbol (404).
    NotFound,
    /// Provider quota exhausted (429).
    RateLimited,
    /// Provider rejected the gateway's credential (502).
    UpstreamUnauthorized,
    /// Provider unreachable or failing (503).
    UpstreamUnavailable,
}

impl ErrorCode {
    /// HTTP status for the code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnauthorized => StatusCode::BAD_GATEWAY,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error body envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Handler error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    /// `INVALID_INPUT` with `message`.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<MarketDataError> for ApiError {
    fn from(err: MarketDataError) -> Self {
        let (code, retry_after_secs) = match &err {
            MarketDataError::NotFound => (ErrorCode::NotFound, None),
            MarketDataError::RateLimited { retry_after_secs } => {
                (ErrorCode::RateLimited, Some(*retry_after_secs))
            }
            MarketDataError::Unauthorized => (ErrorCode::UpstreamUnauthorized, None),
            MarketDataError::UpstreamUnavailable { .. } => (ErrorCode::UpstreamUnavailable, None),
            MarketDataError::InvalidInput { .. } => (ErrorCode::InvalidInput, None),
        };
        Self {
            code,
            message: err.to_string(),
            retry_after_secs,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if status.is_server_error() {
            tracing::warn!(code = ?self.code, message = %self.message, "Request failed upstream");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
