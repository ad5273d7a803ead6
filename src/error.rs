// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error types for the push gateway

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure raised by a document store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Unsupported database path: {0}")]
    Unsupported(String),
}

/// Failure raised by a delivery transport for a single send.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Invalid or unregistered token: {0}")]
    InvalidToken(String),

    #[error("Transport authentication failed: {0}")]
    Unauthorized(String),

    #[error("Send rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Credential error: {0}")]
    Credentials(String),
}

/// Gateway error taxonomy
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    DeliveryFailed(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
}

impl NotifyError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Stable machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::DeliveryFailed(_) => "DELIVERY_FAILED",
            Self::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl From<StoreError> for NotifyError {
    fn from(err: StoreError) -> Self {
        NotifyError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let NotifyError::StoreUnavailable(msg) = &self {
            tracing::error!(error = %msg, "Document store unavailable");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        match self {
            NotifyError::RateLimited { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;
