//! HTTP error responses: `{"error": <code>, "message": <text>}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::errors::{self, ServiceError};

/// `error` value when the server is full.
pub const UNAVAILABLE: &str = "Unavailable";

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Domain error from the service layer.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No caller identity.
    #[error("missing or empty x-user-id header")]
    Unauthorized,

    /// Body or query could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    /// Resource does not exist for the caller.
    #[error("{0}")]
    NotFound(String),

    /// The server refuses new live channels.
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(e) => match e {
                ServiceError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
                ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::InvalidAction { .. } => StatusCode::CONFLICT,
                ServiceError::Contention { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Service(e) => e.code(),
            Self::Unauthorized => errors::UNAUTHORIZED,
            Self::BadRequest(_) => errors::INVALID_REQUEST,
            Self::NotFound(_) => errors::NOT_FOUND,
            Self::Unavailable(_) => UNAVAILABLE,
        }
    }
}

impl From<linkwire_store::StoreError> for ApiError {
    fn from(err: linkwire_store::StoreError) -> Self {
        Self::Service(ServiceError::Store(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // internal details stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}
