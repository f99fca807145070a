//! Token Endpoint
//!
//! Handles the `client_credentials` and `password` grants. Any other grant
//! type is answered with `unsupported_grant_type`.

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Serialize;

use crate::dispatcher::{is_supported_grant_type, TokenRequest};
use crate::error::OAuthError;
use crate::oauth::client_auth::{basic_credentials, merge_client_credentials};
use crate::AppState;

/// Successful token response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Handler for `POST <base>/token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(request) = form.map_err(|rejection| {
        tracing::debug!("Unreadable token request body: {}", rejection);
        OAuthError::MalformedRequest(
            "The request body must be application/x-www-form-urlencoded.".to_string(),
        )
    })?;

    // Unsupported or missing grant types are rejected by the dispatcher
    // without looking at credentials, so the header is left alone for them.
    let request = if is_supported_grant_type(request.grant_type.as_deref()) {
        merge_client_credentials(request, basic_credentials(&headers)?)?
    } else {
        request
    };
    let token = state.dispatcher.dispatch(request).await?;

    let response = TokenResponse {
        access_token: token.access_token,
        token_type: "Bearer",
        expires_in: token.expires_in,
        scope: token.claims.scope,
    };

    // RFC 6749 Section 5.1: token responses must not be cached
    Ok((
        [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
        Json(response),
    )
        .into_response())
}
