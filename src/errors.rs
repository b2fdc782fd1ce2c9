use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::session::SessionId;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound {
        code: &'static str,
        message: &'static str,
    },
    #[error("method not allowed")]
    MethodNotAllowed { allow: Option<&'static str> },
    #[error("conflict: {message}")]
    Conflict {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

/// Failures on the seam between the HTTP adapters and a session's protocol engine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session {0} is closed")]
    Closed(SessionId),
    #[error("backend connect failed: {0}")]
    Connect(String),
    #[error("stdio transport failed: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::BadRequest { code, message }
    }

    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn not_found(code: &'static str, message: &'static str) -> Self {
        Self::NotFound { code, message }
    }

    pub fn method_not_allowed(allow: Option<&'static str>) -> Self {
        Self::MethodNotAllowed { allow }
    }

    pub fn conflict(code: &'static str, message: &'static str) -> Self {
        Self::Conflict { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. }
            | Self::Unauthorized { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::Internal { code, .. } => code,
            Self::MethodNotAllowed { .. } => "method_not_allowed",
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed(_) => Self::not_found("session_not_found", "Session not found"),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            Self::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
            Self::Unauthorized { message, .. } => (StatusCode::UNAUTHORIZED, message),
            Self::NotFound { message, .. } => (StatusCode::NOT_FOUND, message),
            Self::Conflict { message, .. } => (StatusCode::CONFLICT, message),
            Self::MethodNotAllowed { allow } => {
                let mut response =
                    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
                if let Some(allow) = allow {
                    response
                        .headers_mut()
                        .insert(header::ALLOW, HeaderValue::from_static(allow));
                }
                return response;
            }
            Self::Internal { message, .. } => {
                tracing::error!(code, error = %message, "request failed with internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
