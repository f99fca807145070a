//! OAuth 2.0 error responses (RFC 6749 Section 5.2)

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Description shared by every client authentication failure so the caller
/// cannot tell which check rejected the request.
const AUTHENTICATION_FAILED: &str = "The client or resource owner credentials are invalid.";

/// Errors surfaced by the token endpoint
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("unknown client: {0}")]
    UnknownClient(String),

    #[error("invalid credentials presented for client {0}")]
    InvalidCredential(String),

    #[error("client {client_id} is not permitted to use {what}")]
    UnauthorizedGrant { client_id: String, what: String },

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Token error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

impl OAuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::UnknownClient(_)
            | OAuthError::InvalidCredential(_)
            | OAuthError::UnauthorizedGrant { .. } => "invalid_client",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::MalformedRequest(_) => "invalid_request",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::Internal(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::UnknownClient(_)
            | OAuthError::InvalidCredential(_)
            | OAuthError::UnauthorizedGrant { .. } => StatusCode::UNAUTHORIZED,
            OAuthError::UnsupportedGrantType(_)
            | OAuthError::MalformedRequest(_)
            | OAuthError::InvalidScope(_) => StatusCode::BAD_REQUEST,
            OAuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description sent to the caller. Authentication failures all share one
    /// message; the specific reason only goes to the log.
    pub fn description(&self) -> String {
        match self {
            OAuthError::UnknownClient(_)
            | OAuthError::InvalidCredential(_)
            | OAuthError::UnauthorizedGrant { .. } => AUTHENTICATION_FAILED.to_string(),
            OAuthError::UnsupportedGrantType(grant) => {
                format!("The grant type '{}' is not supported.", grant)
            }
            OAuthError::MalformedRequest(reason) => reason.clone(),
            OAuthError::InvalidScope(scope) => format!("The scope '{}' is not allowed.", scope),
            OAuthError::Internal(_) => "The server failed to process the request.".to_string(),
        }
    }

    fn is_authentication_failure(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::Internal(reason) = &self {
            tracing::error!("Token request failed: {}", reason);
        }

        let body = Json(ErrorBody {
            error: self.error_code(),
            error_description: self.description(),
        });
        let no_store = [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")];

        if self.is_authentication_failure() {
            (
                self.status_code(),
                [(header::WWW_AUTHENTICATE, "Basic realm=\"token\"")],
                no_store,
                body,
            )
                .into_response()
        } else {
            (self.status_code(), no_store, body).into_response()
        }
    }
}
