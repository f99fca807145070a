//! Grant dispatch: routes a token request to the matching validator and
//! hands the verified principal to the issuer.
//!
//! ```text
//! Received ──unsupported──────────────▶ Rejected
//!    │
//!    └─supported──▶ Dispatched ──ok───▶ Completed
//!                       └──────error──▶ Rejected
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::OAuthError;
use crate::issuer::{IssuedToken, TokenIssuer};
use crate::registry::GrantType;
use crate::validator::{CredentialValidator, Principal};

/// Raw token request parameters (form-encoded)
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Space-separated scope list
    #[serde(default)]
    pub scope: Option<String>,
}

/// A token request narrowed to a grant this server implements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    ClientCredentials {
        client_id: String,
        client_secret: String,
        scopes: BTreeSet<String>,
    },
    Password {
        client_id: String,
        client_secret: Option<String>,
        username: String,
        password: String,
        scopes: BTreeSet<String>,
    },
}

impl Grant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Grant::ClientCredentials { .. } => GrantType::ClientCredentials,
            Grant::Password { .. } => GrantType::Password,
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            Grant::ClientCredentials { client_id, .. } | Grant::Password { client_id, .. } => {
                client_id
            }
        }
    }

    /// Narrow a raw request. The grant type is checked before anything else
    /// so unsupported grants are rejected without looking at credentials.
    pub fn from_request(request: TokenRequest) -> Result<Self, OAuthError> {
        let grant_type = non_empty(request.grant_type)
            .ok_or_else(|| OAuthError::MalformedRequest("The 'grant_type' parameter is missing.".into()))?;

        match grant_type.as_str() {
            CLIENT_CREDENTIALS => {
                let client_id = required(request.client_id, "client_id")?;
                let client_secret = required(request.client_secret, "client_secret")?;
                Ok(Grant::ClientCredentials {
                    client_id,
                    client_secret,
                    scopes: parse_scopes(request.scope.as_deref()),
                })
            }
            PASSWORD => {
                let client_id = required(request.client_id, "client_id")?;
                let username = required(request.username, "username")?;
                let password = required(request.password, "password")?;
                Ok(Grant::Password {
                    client_id,
                    client_secret: non_empty(request.client_secret),
                    username,
                    password,
                    scopes: parse_scopes(request.scope.as_deref()),
                })
            }
            other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

const CLIENT_CREDENTIALS: &str = "client_credentials";
const PASSWORD: &str = "password";

/// Whether `grant_type` names a grant this server implements
pub fn is_supported_grant_type(grant_type: Option<&str>) -> bool {
    matches!(grant_type, Some(CLIENT_CREDENTIALS | PASSWORD))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String, OAuthError> {
    non_empty(value)
        .ok_or_else(|| OAuthError::MalformedRequest(format!("The '{}' parameter is missing.", name)))
}

pub fn parse_scopes(scope: Option<&str>) -> BTreeSet<String> {
    scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Lifecycle of one token request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Dispatched,
    Completed,
    Rejected,
}

impl DispatchState {
    fn can_advance_to(self, next: DispatchState) -> bool {
        matches!(
            (self, next),
            (DispatchState::Received, DispatchState::Dispatched)
                | (DispatchState::Received, DispatchState::Rejected)
                | (DispatchState::Dispatched, DispatchState::Completed)
                | (DispatchState::Dispatched, DispatchState::Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Completed | DispatchState::Rejected)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Received => "received",
            DispatchState::Dispatched => "dispatched",
            DispatchState::Completed => "completed",
            DispatchState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Tracks the state of a single request through dispatch
#[derive(Debug)]
struct Dispatch {
    id: uuid::Uuid,
    state: DispatchState,
}

impl Dispatch {
    fn new() -> Self {
        let dispatch = Self {
            id: uuid::Uuid::new_v4(),
            state: DispatchState::Received,
        };
        tracing::debug!(request = %dispatch.id, state = %dispatch.state, "Token request");
        dispatch
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal dispatch transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(request = %self.id, from = %self.state, to = %next, "Token request");
        self.state = next;
    }

    fn reject(&mut self, err: OAuthError) -> OAuthError {
        self.advance(DispatchState::Rejected);
        tracing::warn!(request = %self.id, "Token request rejected: {}", err);
        err
    }
}

/// Outcome of a dispatch, with the terminal state it reached
#[derive(Debug)]
pub struct DispatchOutcome {
    pub state: DispatchState,
    pub result: Result<IssuedToken, OAuthError>,
}

pub struct GrantDispatcher {
    validator: Arc<dyn CredentialValidator>,
    issuer: Arc<TokenIssuer>,
}

impl GrantDispatcher {
    pub fn new(validator: Arc<dyn CredentialValidator>, issuer: Arc<TokenIssuer>) -> Self {
        Self { validator, issuer }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Run a request to completion and return the issued token
    pub async fn dispatch(&self, request: TokenRequest) -> Result<IssuedToken, OAuthError> {
        self.dispatch_traced(request).await.result
    }

    pub async fn dispatch_traced(&self, request: TokenRequest) -> DispatchOutcome {
        let mut dispatch = Dispatch::new();

        let grant = match Grant::from_request(request) {
            Ok(grant) => grant,
            Err(err) => return Self::finish(&mut dispatch, Err(err)),
        };

        dispatch.advance(DispatchState::Dispatched);
        tracing::debug!(
            request = %dispatch.id,
            grant_type = %grant.grant_type(),
            client_id = grant.client_id(),
            "Dispatching grant"
        );

        let result = match self.validate(&grant).await {
            Ok(principal) => self.issuer.issue(&principal),
            Err(err) => Err(err),
        };
        Self::finish(&mut dispatch, result)
    }

    async fn validate(&self, grant: &Grant) -> Result<Principal, OAuthError> {
        match grant {
            Grant::ClientCredentials {
                client_id,
                client_secret,
                scopes,
            } => {
                self.validator
                    .validate_client_credentials(client_id, client_secret, scopes)
                    .await
            }
            Grant::Password {
                client_id,
                client_secret,
                username,
                password,
                scopes,
            } => {
                self.validator
                    .validate_password(client_id, client_secret.as_deref(), username, password, scopes)
                    .await
            }
        }
    }

    fn finish(
        dispatch: &mut Dispatch,
        result: Result<IssuedToken, OAuthError>,
    ) -> DispatchOutcome {
        let result = match result {
            Ok(token) => {
                dispatch.advance(DispatchState::Completed);
                tracing::info!(
                    request = %dispatch.id,
                    sub = %token.claims.sub,
                    client_id = %token.claims.client_id,
                    "Issued access token"
                );
                Ok(token)
            }
            Err(err) => Err(dispatch.reject(err)),
        };
        debug_assert!(dispatch.state.is_terminal());
        DispatchOutcome {
            state: dispatch.state,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::keys::SigningKey;
    use crate::validator::PrincipalKind;

    const FIXTURE: &str = include_str!("../tests/fixtures/signing-key.pem");

    /// Accepts the secret "ok" and counts how often it is consulted
    #[derive(Default)]
    struct CountingValidator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialValidator for CountingValidator {
        async fn validate_client_credentials(
            &self,
            client_id: &str,
            client_secret: &str,
            scopes: &BTreeSet<String>,
        ) -> Result<Principal, OAuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if client_secret != "ok" {
                return Err(OAuthError::InvalidCredential(client_id.into()));
            }
            Ok(Principal {
                subject: client_id.into(),
                name: "Counting".into(),
                client_id: client_id.into(),
                kind: PrincipalKind::Client,
                scopes: scopes.clone(),
            })
        }

        async fn validate_password(
            &self,
            client_id: &str,
            _client_secret: Option<&str>,
            username: &str,
            password: &str,
            scopes: &BTreeSet<String>,
        ) -> Result<Principal, OAuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if password != "ok" {
                return Err(OAuthError::InvalidCredential(client_id.into()));
            }
            Ok(Principal {
                subject: username.into(),
                name: username.into(),
                client_id: client_id.into(),
                kind: PrincipalKind::ResourceOwner,
                scopes: scopes.clone(),
            })
        }
    }

    fn dispatcher() -> (GrantDispatcher, Arc<CountingValidator>) {
        let validator = Arc::new(CountingValidator::default());
        let issuer = TokenIssuer::new(
            SigningKey::from_pem(FIXTURE).unwrap(),
            "http://localhost:5000",
            "resource-server",
            3600,
        );
        (
            GrantDispatcher::new(validator.clone(), Arc::new(issuer)),
            validator,
        )
    }

    fn request(grant_type: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some(grant_type.into()),
            client_id: Some("console".into()),
            client_secret: Some("ok".into()),
            username: Some("u".into()),
            password: Some("ok".into()),
            scope: None,
        }
    }

    #[tokio::test]
    async fn test_unsupported_grant_never_reaches_validator() {
        let (dispatcher, validator) = dispatcher();
        for grant_type in ["authorization_code", "refresh_token", "urn:custom"] {
            let outcome = dispatcher.dispatch_traced(request(grant_type)).await;
            assert_eq!(outcome.state, DispatchState::Rejected);
            assert!(matches!(
                outcome.result,
                Err(OAuthError::UnsupportedGrantType(g)) if g == grant_type
            ));
        }
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_grant_type_is_malformed() {
        let (dispatcher, validator) = dispatcher();
        let outcome = dispatcher.dispatch_traced(TokenRequest::default()).await;
        assert_eq!(outcome.state, DispatchState::Rejected);
        assert!(matches!(outcome.result, Err(OAuthError::MalformedRequest(_))));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_fields_are_malformed() {
        let (dispatcher, validator) = dispatcher();

        let mut no_secret = request("client_credentials");
        no_secret.client_secret = None;
        assert!(matches!(
            dispatcher.dispatch(no_secret).await,
            Err(OAuthError::MalformedRequest(_))
        ));

        let mut no_username = request("password");
        no_username.username = Some(String::new());
        assert!(matches!(
            dispatcher.dispatch(no_username).await,
            Err(OAuthError::MalformedRequest(_))
        ));

        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_client_credentials_completes() {
        let (dispatcher, validator) = dispatcher();
        let outcome = dispatcher
            .dispatch_traced(request("client_credentials"))
            .await;

        assert_eq!(outcome.state, DispatchState::Completed);
        let token = outcome.result.unwrap();
        assert_eq!(token.claims.sub, "console");
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_password_completes_with_user_subject() {
        let (dispatcher, _) = dispatcher();
        let token = dispatcher.dispatch(request("password")).await.unwrap();
        assert_eq!(token.claims.sub, "u");
        assert_eq!(token.claims.client_id, "console");
    }

    #[tokio::test]
    async fn test_validator_failure_is_rejected() {
        let (dispatcher, validator) = dispatcher();
        let mut bad = request("password");
        bad.password = Some("wrong".into());

        let outcome = dispatcher.dispatch_traced(bad).await;
        assert_eq!(outcome.state, DispatchState::Rejected);
        assert!(matches!(outcome.result, Err(OAuthError::InvalidCredential(_))));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transitions() {
        use DispatchState::*;
        assert!(Received.can_advance_to(Dispatched));
        assert!(Received.can_advance_to(Rejected));
        assert!(!Received.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Rejected));
        assert!(!Rejected.can_advance_to(Dispatched));
        assert!(Completed.is_terminal() && Rejected.is_terminal());
        assert!(!Dispatched.is_terminal());
    }

    #[test]
    fn test_supported_grant_types() {
        assert!(is_supported_grant_type(Some("client_credentials")));
        assert!(is_supported_grant_type(Some("password")));
        assert!(!is_supported_grant_type(Some("authorization_code")));
        assert!(!is_supported_grant_type(Some("")));
        assert!(!is_supported_grant_type(None));
    }

    #[test]
    fn test_parse_scopes() {
        assert!(parse_scopes(None).is_empty());
        assert_eq!(
            parse_scopes(Some(" profile  marketing_api ")),
            BTreeSet::from(["marketing_api".to_string(), "profile".to_string()])
        );
    }
}
