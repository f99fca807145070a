//! HTTP Basic client authentication (RFC 6749 Section 2.3.1)

use std::borrow::Cow;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use percent_encoding::percent_decode_str;

use crate::dispatcher::TokenRequest;
use crate::error::OAuthError;

/// Credentials carried in an `Authorization: Basic` header
#[derive(Debug, PartialEq, Eq)]
pub struct BasicCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Parse the Basic header if present. Any other scheme is ignored.
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<BasicCredentials>, OAuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| malformed("The Authorization header is not valid ASCII."))?;

    let Some(encoded) = value
        .split_once(' ')
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("basic"))
        .map(|(_, rest)| rest.trim())
    else {
        return Ok(None);
    };

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| malformed("The Basic credentials are not valid base64."))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| malformed("The Basic credentials are not UTF-8."))?;
    let (id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| malformed("The Basic credentials are missing a ':' separator."))?;

    Ok(Some(BasicCredentials {
        client_id: form_decode(id)?,
        client_secret: form_decode(secret)?,
    }))
}

/// Fold Basic credentials into the form parameters.
///
/// A client must use a single authentication method, so a secret in both
/// places, or two different client ids, is rejected.
pub fn merge_client_credentials(
    mut request: TokenRequest,
    basic: Option<BasicCredentials>,
) -> Result<TokenRequest, OAuthError> {
    let Some(basic) = basic else {
        return Ok(request);
    };

    if request.client_secret.is_some() {
        return Err(malformed(
            "Client credentials must not be sent in both the header and the body.",
        ));
    }
    if let Some(client_id) = &request.client_id {
        if *client_id != basic.client_id {
            return Err(malformed(
                "The client_id parameter does not match the Authorization header.",
            ));
        }
    }

    request.client_id = Some(basic.client_id);
    request.client_secret = Some(basic.client_secret);
    Ok(request)
}

/// Undo the form-urlencoding applied to one Basic credential.
///
/// The value is decoded as a whole: a raw `=` or `&` is part of it.
fn form_decode(value: &str) -> Result<String, OAuthError> {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| malformed("The Basic credentials are not UTF-8."))
}

fn malformed(reason: &str) -> OAuthError {
    OAuthError::MalformedRequest(reason.to_string())
}
