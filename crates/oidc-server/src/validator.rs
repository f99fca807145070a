//! Client and resource-owner credential validation
//!
//! Every rejection is reported to the caller with one generic
//! `invalid_client` body; the precise reason is only logged.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OAuthError;
use crate::registry::{Client, ClientRegistry, Endpoint, GrantType};
use crate::users::UserStore;

/// Who a principal was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    Client,
    ResourceOwner,
}

/// The verified identity a token is issued for. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub name: String,
    /// The client that made the token request
    pub client_id: String,
    pub kind: PrincipalKind,
    pub scopes: BTreeSet<String>,
}

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &BTreeSet<String>,
    ) -> Result<Principal, OAuthError>;

    async fn validate_password(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
    ) -> Result<Principal, OAuthError>;
}

/// Validates against the in-memory client registry and user store
pub struct RegistryValidator {
    clients: Arc<ClientRegistry>,
    users: Arc<UserStore>,
}

impl RegistryValidator {
    pub fn new(clients: Arc<ClientRegistry>, users: Arc<UserStore>) -> Self {
        Self { clients, users }
    }

    /// Resolve a client and check it may use `grant` at the token endpoint
    fn permitted_client(&self, client_id: &str, grant: GrantType) -> Result<Arc<Client>, OAuthError> {
        let client = self
            .clients
            .find(client_id)
            .map_err(|_| OAuthError::UnknownClient(client_id.to_string()))?;

        if !client.permits_endpoint(Endpoint::Token) {
            return Err(OAuthError::UnauthorizedGrant {
                client_id: client_id.to_string(),
                what: "the token endpoint".to_string(),
            });
        }
        if !client.permits_grant(grant) {
            return Err(OAuthError::UnauthorizedGrant {
                client_id: client_id.to_string(),
                what: grant.to_string(),
            });
        }
        Ok(client)
    }

    async fn authenticate_client(&self, client: &Client, secret: Option<&str>) -> Result<(), OAuthError> {
        if !client.is_confidential() {
            return Ok(());
        }
        let Some(secret) = secret else {
            return Err(OAuthError::InvalidCredential(client.client_id.clone()));
        };
        if self.clients.verify_secret(client, secret).await {
            Ok(())
        } else {
            Err(OAuthError::InvalidCredential(client.client_id.clone()))
        }
    }
}

/// Every requested scope must be registered on the client
fn check_scopes(client: &Client, scopes: &BTreeSet<String>) -> Result<(), OAuthError> {
    match scopes.iter().find(|scope| !client.permits_scope(scope)) {
        Some(scope) => Err(OAuthError::InvalidScope(scope.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl CredentialValidator for RegistryValidator {
    async fn validate_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &BTreeSet<String>,
    ) -> Result<Principal, OAuthError> {
        let client = self.permitted_client(client_id, GrantType::ClientCredentials)?;

        // A public client cannot prove its identity, so it never gets a
        // client_credentials token.
        if !client.is_confidential() {
            return Err(OAuthError::InvalidCredential(client_id.to_string()));
        }
        self.authenticate_client(&client, Some(client_secret)).await?;
        check_scopes(&client, scopes)?;

        Ok(Principal {
            subject: client.client_id.clone(),
            name: client.display_name.clone(),
            client_id: client.client_id.clone(),
            kind: PrincipalKind::Client,
            scopes: scopes.clone(),
        })
    }

    async fn validate_password(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
    ) -> Result<Principal, OAuthError> {
        let client = self.permitted_client(client_id, GrantType::Password)?;
        self.authenticate_client(&client, client_secret).await?;
        check_scopes(&client, scopes)?;

        let Some(user) = self.users.authenticate(username, password).await else {
            tracing::warn!("Password grant for {} rejected: bad username or password", username);
            return Err(OAuthError::InvalidCredential(client_id.to_string()));
        };

        Ok(Principal {
            subject: user.subject.clone(),
            name: user.display_name.clone(),
            client_id: client.client_id.clone(),
            kind: PrincipalKind::ResourceOwner,
            scopes: scopes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientDescriptor;

    fn validator() -> RegistryValidator {
        let clients = ClientRegistry::new();
        clients
            .register(ClientDescriptor {
                client_id: "svc".into(),
                client_secret: Some("svc-secret".into()),
                display_name: "Service".into(),
                grant_types: [GrantType::ClientCredentials].into(),
                endpoints: [Endpoint::Token].into(),
                scopes: ["reports".to_string()].into(),
                ..Default::default()
            })
            .unwrap();
        clients
            .register(ClientDescriptor {
                client_id: "app".into(),
                client_secret: Some("app-secret".into()),
                display_name: "App".into(),
                grant_types: [GrantType::Password].into(),
                endpoints: [Endpoint::Token].into(),
                scopes: ["profile".to_string()].into(),
                ..Default::default()
            })
            .unwrap();
        clients
            .register(ClientDescriptor {
                client_id: "web".into(),
                client_secret: Some("web-secret".into()),
                display_name: "Web".into(),
                grant_types: [GrantType::ClientCredentials].into(),
                endpoints: [Endpoint::Authorization].into(),
                ..Default::default()
            })
            .unwrap();

        let users = UserStore::new();
        users.add("alice", "wonderland", "user-1", "Alice").unwrap();

        RegistryValidator::new(Arc::new(clients), Arc::new(users))
    }

    fn no_scopes() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[tokio::test]
    async fn test_client_credentials_subject_is_client_id() {
        let principal = validator()
            .validate_client_credentials("svc", "svc-secret", &no_scopes())
            .await
            .unwrap();
        assert_eq!(principal.subject, "svc");
        assert_eq!(principal.client_id, "svc");
        assert_eq!(principal.name, "Service");
        assert_eq!(principal.kind, PrincipalKind::Client);
    }

    #[tokio::test]
    async fn test_client_credentials_failures() {
        let v = validator();
        assert!(matches!(
            v.validate_client_credentials("ghost", "x", &no_scopes()).await,
            Err(OAuthError::UnknownClient(_))
        ));
        assert!(matches!(
            v.validate_client_credentials("svc", "wrong", &no_scopes()).await,
            Err(OAuthError::InvalidCredential(_))
        ));
        // Permitted for password only
        assert!(matches!(
            v.validate_client_credentials("app", "app-secret", &no_scopes()).await,
            Err(OAuthError::UnauthorizedGrant { .. })
        ));
        // Grant allowed but no token endpoint permission
        assert!(matches!(
            v.validate_client_credentials("web", "web-secret", &no_scopes()).await,
            Err(OAuthError::UnauthorizedGrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_scopes_must_be_registered() {
        let v = validator();
        let principal = v
            .validate_client_credentials("svc", "svc-secret", &["reports".to_string()].into())
            .await
            .unwrap();
        assert!(principal.scopes.contains("reports"));

        let err = v
            .validate_client_credentials("svc", "svc-secret", &["admin".to_string()].into())
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidScope(s) if s == "admin"));
    }

    #[tokio::test]
    async fn test_password_grant_uses_resource_owner_subject() {
        let principal = validator()
            .validate_password("app", Some("app-secret"), "alice", "wonderland", &no_scopes())
            .await
            .unwrap();
        assert_eq!(principal.subject, "user-1");
        assert_eq!(principal.name, "Alice");
        assert_eq!(principal.client_id, "app");
        assert_eq!(principal.kind, PrincipalKind::ResourceOwner);
    }

    #[tokio::test]
    async fn test_password_grant_failures() {
        let v = validator();
        assert!(matches!(
            v.validate_password("app", Some("app-secret"), "alice", "wrong", &no_scopes())
                .await,
            Err(OAuthError::InvalidCredential(_))
        ));
        // Confidential client must send its secret
        assert!(matches!(
            v.validate_password("app", None, "alice", "wonderland", &no_scopes())
                .await,
            Err(OAuthError::InvalidCredential(_))
        ));
        assert!(matches!(
            v.validate_password("svc", Some("svc-secret"), "alice", "wonderland", &no_scopes())
                .await,
            Err(OAuthError::UnauthorizedGrant { .. })
        ));
    }
}
