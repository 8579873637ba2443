use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::types::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Signature request not found: {0}")]
    RequestNotFound(String),

    #[error("You are not a recipient of this signature request")]
    NotAuthorized,

    #[error("You already signed this document")]
    AlreadySigned,

    #[error("No PDF versions available for this document")]
    NoVersionsAvailable,

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn identity_not_found(msg: impl Into<String>) -> Self {
        Self::IdentityNotFound(msg.into())
    }

    pub fn request_not_found(id: impl std::fmt::Display) -> Self {
        Self::RequestNotFound(id.to_string())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable category string sent to clients next to the message
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::IdentityNotFound(_) => "identity_not_found",
            ApiError::RequestNotFound(_) => "request_not_found",
            ApiError::NotAuthorized => "not_authorized",
            ApiError::AlreadySigned => "already_signed",
            ApiError::NoVersionsAvailable => "no_versions_available",
            ApiError::Storage(_) => "storage_failure",
            ApiError::Timeout(_) => "timeout",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::IdentityNotFound(_) => StatusCode::UNAUTHORIZED,
            ApiError::RequestNotFound(_) | ApiError::NoVersionsAvailable => StatusCode::NOT_FOUND,
            ApiError::NotAuthorized => StatusCode::FORBIDDEN,
            ApiError::AlreadySigned => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same call unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Storage(_) | ApiError::Timeout(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = match &self {
            ApiError::IdentityNotFound(_) => {
                Some("Send the authenticated user's email in the 'X-Authenticated-User' header")
            }
            ApiError::NoVersionsAvailable => Some("Nobody has signed this document yet"),
            ApiError::Storage(_) | ApiError::Timeout(_) => Some("Please try again later"),
            ApiError::Internal(_) => Some("Please try again later or contact support"),
            _ => None,
        };

        let body = ApiResponse::<()>::error(self.to_string(), self.code(), hint);
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
