//! Access token construction and signing
//!
//! Tokens are stateless RS256 JWTs: nothing about an issued token is kept on
//! the server, and they are only ever invalidated by expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::keys::SigningKey;
use crate::validator::Principal;

/// Claims carried by every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub client_id: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// A freshly signed token ready to be returned to the caller
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
    pub claims: AccessTokenClaims,
}

pub struct TokenIssuer {
    key: SigningKey,
    issuer: String,
    audience: String,
    lifetime_secs: u64,
}

impl TokenIssuer {
    pub fn new(
        key: SigningKey,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        lifetime_secs: u64,
    ) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            audience: audience.into(),
            lifetime_secs,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    /// Sign an access token for a validated principal
    pub fn issue(&self, principal: &Principal) -> Result<IssuedToken, OAuthError> {
        let now = Utc::now();
        let exp = i64::try_from(self.lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                OAuthError::Internal(format!(
                    "token lifetime of {}s is out of range",
                    self.lifetime_secs
                ))
            })?;

        let scope = if principal.scopes.is_empty() {
            None
        } else {
            Some(principal.scopes.iter().cloned().collect::<Vec<_>>().join(" "))
        };

        let claims = AccessTokenClaims {
            sub: principal.subject.clone(),
            name: principal.name.clone(),
            scope,
            client_id: principal.client_id.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.kid().to_string());

        let access_token = encode(&header, &claims, self.key.encoding_key())
            .map_err(|e| OAuthError::Internal(format!("failed to sign token: {}", e)))?;

        tracing::debug!(
            kind = ?principal.kind,
            sub = %claims.sub,
            client_id = %claims.client_id,
            jti = %claims.jti,
            "Signed access token"
        );

        Ok(IssuedToken {
            access_token,
            expires_in: self.lifetime_secs,
            claims,
        })
    }

    /// Verify signature, issuer, audience and expiry of a token this server issued
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        decode::<AccessTokenClaims>(token, self.key.decoding_key(), &validation)
            .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::validator::PrincipalKind;

    const FIXTURE: &str = include_str!("../tests/fixtures/signing-key.pem");

    fn issuer(lifetime_secs: u64) -> TokenIssuer {
        let key = SigningKey::from_pem(FIXTURE).unwrap();
        TokenIssuer::new(key, "http://localhost:5000", "resource-server", lifetime_secs)
    }

    fn console() -> Principal {
        Principal {
            subject: "console".into(),
            name: "My client application".into(),
            client_id: "console".into(),
            kind: PrincipalKind::Client,
            scopes: BTreeSet::new(),
        }
    }

    #[test]
    fn test_issue_sets_subject_name_and_expiry() {
        let issuer = issuer(600);
        let token = issuer.issue(&console()).unwrap();

        assert_eq!(token.expires_in, 600);
        assert_eq!(token.claims.sub, "console");
        assert_eq!(token.claims.name, "My client application");
        assert_eq!(token.claims.exp - token.claims.iat, 600);
        assert_eq!(token.claims.scope, None);

        let header = jsonwebtoken::decode_header(&token.access_token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(issuer.key.kid()));
    }

    #[test]
    fn test_issued_token_validates() {
        let issuer = issuer(600);
        let token = issuer.issue(&console()).unwrap();
        let claims = issuer.validate(&token.access_token).unwrap();
        assert_eq!(claims, token.claims);
    }

    #[test]
    fn test_scope_is_space_separated() {
        let issuer = issuer(600);
        let mut principal = console();
        principal.scopes = ["profile".to_string(), "marketing_api".to_string()].into();

        let token = issuer.issue(&principal).unwrap();
        assert_eq!(token.claims.scope.as_deref(), Some("marketing_api profile"));
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        for lifetime_secs in [u64::MAX, i64::MAX as u64, 10_000_000_000_000_000] {
            let err = issuer(lifetime_secs).issue(&console()).unwrap_err();
            assert!(matches!(err, OAuthError::Internal(_)));
        }
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let issuer = issuer(600);
        let a = issuer.issue(&console()).unwrap();
        let b = issuer.issue(&console()).unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
    }

    #[test]
    fn test_foreign_audience_rejected() {
        let ours = issuer(600);
        let key = SigningKey::from_pem(FIXTURE).unwrap();
        let theirs = TokenIssuer::new(key, "http://localhost:5000", "someone-else", 600);

        let token = theirs.issue(&console()).unwrap();
        assert!(ours.validate(&token.access_token).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let issuer = issuer(600);
        let token = issuer.issue(&console()).unwrap().access_token;
        let forged_payload = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            br#"{"sub":"admin"}"#,
        );
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        assert!(issuer.validate(&parts.join(".")).is_err());
    }
}
